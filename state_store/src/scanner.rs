use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use data_model::{
    ChunkIndex,
    FileData,
    FileDownloadResponse,
    FileId,
    FileRecord,
    Principal,
};
use metrics::{StateStoreMetrics, Timer};
use opentelemetry::KeyValue;
use rocksdb::{IteratorMode, ReadOptions, TransactionDB};
use tracing::warn;

use super::state_machine::FileVaultColumns;
use crate::serializer::{JsonEncode, JsonEncoder};

pub struct StateReader {
    db: Arc<TransactionDB>,
    metrics: Arc<StateStoreMetrics>,
}

impl StateReader {
    pub fn new(db: Arc<TransactionDB>, metrics: Arc<StateStoreMetrics>) -> Self {
        Self { db, metrics }
    }

    pub fn get_file(&self, file_id: FileId) -> Result<Option<FileRecord>> {
        let kvs = &[KeyValue::new("op", "get_file")];
        let _timer = Timer::start_with_labels(&self.metrics.state_read, kvs);
        let cf = FileVaultColumns::Files.cf(&self.db)?;
        self.db
            .get_cf(cf, file_id.key())?
            .map(|bytes| JsonEncoder::decode::<FileRecord>(&bytes))
            .transpose()
    }

    /// Every record in the catalog, in file id order.
    pub fn all_files(&self) -> Result<Vec<FileRecord>> {
        let kvs = &[KeyValue::new("op", "all_files")];
        let _timer = Timer::start_with_labels(&self.metrics.state_read, kvs);
        let cf = FileVaultColumns::Files.cf(&self.db)?;
        let mut read_options = ReadOptions::default();
        read_options.set_readahead_size(4_194_304);
        let iter = self
            .db
            .iterator_cf_opt(cf, read_options, IteratorMode::Start);

        let mut records = Vec::new();
        for kv in iter {
            let (_, value) = kv?;
            records.push(JsonEncoder::decode::<FileRecord>(&value)?);
        }
        Ok(records)
    }

    /// Records visible to `caller`. Records with a pending deletion intent
    /// are hidden.
    pub fn list_files(&self, caller: Option<&Principal>) -> Result<Vec<FileRecord>> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(|record| !record.is_marked_for_deletion() && record.is_readable_by(caller))
            .collect())
    }

    pub fn get_chunk(&self, file_id: FileId, chunk_index: ChunkIndex) -> Result<Option<Bytes>> {
        let cf = FileVaultColumns::Chunks.cf(&self.db)?;
        Ok(self
            .db
            .get_cf(cf, file_id.chunk_key(chunk_index))?
            .map(Bytes::from))
    }

    pub fn download_file(
        &self,
        caller: Option<&Principal>,
        file_id: FileId,
        chunk_index: ChunkIndex,
    ) -> Result<FileDownloadResponse> {
        let Some(record) = self.get_file(file_id)? else {
            return Ok(FileDownloadResponse::NotFoundFile);
        };
        if let Err(rejection) = record.check_download(caller, chunk_index) {
            return Ok(rejection);
        }
        let Some(contents) = self.get_chunk(file_id, chunk_index)? else {
            warn!(
                file_id = file_id.get(),
                chunk_index, "uploaded file is missing a chunk"
            );
            return Ok(FileDownloadResponse::NotFoundFile);
        };
        Ok(FileDownloadResponse::FoundFile(FileData {
            contents,
            file_type: record.file_type,
            num_chunks: record.num_chunks,
        }))
    }

    /// Partial uploads whose lease ran out at or before `now`.
    pub fn expired_uploads(&self, now: u64) -> Result<Vec<FileRecord>> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(|record| record.lease_expired(now))
            .collect())
    }
}
