use std::sync::Arc;

use blob_store::ContentStore;
use bytes::Bytes;
use data_model::{FileId, StorageProvider, UploadFileAtomicRequest, UploadFileContinueRequest};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    chunker::Chunker,
    error::FileVaultError,
    registration::register_blob,
    remote_store::PrimaryBackend,
};

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub file_type: String,
    pub contents: Bytes,
    pub storage_provider: StorageProvider,
}

/// Drives an upload through either backend.
pub struct UploadCoordinator {
    backend: Arc<dyn PrimaryBackend>,
    content_store: Arc<dyn ContentStore>,
    chunk_size: usize,
    max_upload_size: usize,
}

impl UploadCoordinator {
    pub fn new(
        backend: Arc<dyn PrimaryBackend>,
        content_store: Arc<dyn ContentStore>,
        chunk_size: usize,
        max_upload_size: usize,
    ) -> Self {
        Self {
            backend,
            content_store,
            chunk_size,
            max_upload_size,
        }
    }

    /// Uploads `request` and reports progress as a percentage on
    /// `progress`. Oversized payloads are rejected before any backend call.
    pub async fn upload(
        &self,
        request: UploadRequest,
        progress: &watch::Sender<u8>,
    ) -> Result<FileId, FileVaultError> {
        let size = request.contents.len();
        if size > self.max_upload_size {
            return Err(FileVaultError::SizeExceeded {
                size,
                limit: self.max_upload_size,
            });
        }
        progress.send_replace(0);
        let file_id = match request.storage_provider {
            StorageProvider::PrimaryChunked => self.upload_chunked(request, progress).await?,
            StorageProvider::SecondaryBlob => {
                let file_id = register_blob(
                    self.backend.as_ref(),
                    self.content_store.as_ref(),
                    &request.file_name,
                    &request.file_type,
                    request.contents,
                )
                .await?;
                progress.send_replace(100);
                file_id
            }
        };
        Ok(file_id)
    }

    async fn upload_chunked(
        &self,
        request: UploadRequest,
        progress: &watch::Sender<u8>,
    ) -> Result<FileId, FileVaultError> {
        let chunker = Chunker::new(request.contents, self.chunk_size)?;
        let num_chunks = chunker.num_chunks();
        let mut chunks = chunker.chunks();

        let first = chunks.next().unwrap_or_default();
        let file_id = self
            .backend
            .upload_file_atomic(UploadFileAtomicRequest {
                name: request.file_name.clone(),
                content: first,
                file_type: request.file_type.clone(),
                num_chunks,
                owner: None,
            })
            .await?;
        progress.send_replace(percent(1, num_chunks));
        info!(file_id = file_id.get(), num_chunks, "started chunked upload");

        for (chunk_index, content) in (1..num_chunks).zip(chunks) {
            self.backend
                .upload_file_continue(UploadFileContinueRequest {
                    file_id,
                    chunk_index,
                    content,
                    file_type: request.file_type.clone(),
                    num_chunks,
                })
                .await?;
            let completed = chunk_index + 1;
            debug!(file_id = file_id.get(), completed, num_chunks, "chunk accepted");
            progress.send_replace(percent(completed, num_chunks));
        }
        Ok(file_id)
    }
}

fn percent(completed: u64, total: u64) -> u8 {
    (completed.saturating_mul(100) / total.max(1)).min(100) as u8
}
