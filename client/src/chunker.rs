use bytes::Bytes;

use crate::error::FileVaultError;

/// Splits a payload into contiguous chunks of at most `chunk_size` bytes.
///
/// Chunks are zero-copy slices of the payload. An empty payload still yields
/// one empty chunk so the file can be created through the atomic call.
#[derive(Debug, Clone)]
pub struct Chunker {
    payload: Bytes,
    chunk_size: usize,
}

impl Chunker {
    pub fn new(payload: Bytes, chunk_size: usize) -> Result<Self, FileVaultError> {
        if chunk_size == 0 {
            return Err(FileVaultError::InvalidConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        Ok(Self {
            payload,
            chunk_size,
        })
    }

    pub fn num_chunks(&self) -> u64 {
        self.payload.len().div_ceil(self.chunk_size).max(1) as u64
    }

    pub fn chunk(&self, index: u64) -> Option<Bytes> {
        if index >= self.num_chunks() {
            return None;
        }
        let start = index as usize * self.chunk_size;
        let end = (start + self.chunk_size).min(self.payload.len());
        Some(self.payload.slice(start..end))
    }

    /// Restartable: every call walks the payload from the first chunk.
    pub fn chunks(&self) -> impl Iterator<Item = Bytes> + '_ {
        (0..self.num_chunks()).filter_map(move |index| self.chunk(index))
    }
}
