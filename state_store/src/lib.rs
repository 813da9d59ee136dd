use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use data_model::{
    AbortUploadResult,
    DeleteFileResult,
    FileId,
    FileRecord,
    FileSharingResponse,
    Principal,
    RegisterFileError,
    RegisterFileRequest,
    UploadFileAtomicRequest,
    UploadFileContinueRequest,
    UploadFileError,
};
use filevault_utils::get_epoch_time_in_ms;
use metrics::{StateStoreMetrics, Timer};
use opentelemetry::KeyValue;
use rocksdb::{ColumnFamilyDescriptor, Options, TransactionDB, TransactionDBOptions};
use state_machine::{FileVaultColumns, Txn};
use strum::IntoEnumIterator;
use tracing::{debug, info};

pub mod scanner;
pub mod serializer;
pub mod state_machine;
pub mod test_state_store;

/// Persistent file catalog. Every mutation runs in its own RocksDB
/// transaction and locks the records it reads, so concurrent calls for the
/// same file serialize.
pub struct FileVaultState {
    pub db: Arc<TransactionDB>,
    pub metrics: Arc<StateStoreMetrics>,
    upload_lease_secs: u64,
}

impl FileVaultState {
    pub async fn new(path: PathBuf, upload_lease_secs: u64) -> Result<Arc<Self>> {
        fs::create_dir_all(path.clone())
            .map_err(|e| anyhow!("failed to create state store dir: {}", e))?;

        let sm_column_families = FileVaultColumns::iter()
            .map(|cf| ColumnFamilyDescriptor::new(cf.to_string(), Options::default()));
        let mut db_opts = Options::default();
        db_opts.create_missing_column_families(true);
        db_opts.create_if_missing(true);
        let db = Arc::new(
            TransactionDB::open_cf_descriptors(
                &db_opts,
                &TransactionDBOptions::default(),
                &path,
                sm_column_families,
            )
            .map_err(|e| anyhow!("failed to open db: {}", e))?,
        );
        info!(path = %path.display(), "initialized state store");
        Ok(Arc::new(Self {
            db,
            metrics: Arc::new(StateStoreMetrics::new()),
            upload_lease_secs,
        }))
    }

    pub fn reader(&self) -> scanner::StateReader {
        scanner::StateReader::new(self.db.clone(), self.metrics.clone())
    }

    pub fn upload_lease_secs(&self) -> u64 {
        self.upload_lease_secs
    }

    fn write<T>(&self, request: &'static str, f: impl FnOnce(&Txn) -> Result<T>) -> Result<T> {
        let timer_kv = &[KeyValue::new("request", request)];
        let _timer = Timer::start_with_labels(&self.metrics.state_write, timer_kv);
        debug!(request, "writing catalog update");
        let txn = self.db.transaction();
        let result = f(&txn)?;
        txn.commit()?;
        Ok(result)
    }

    /// Creates a chunked record and stores chunk 0 in one transaction.
    #[tracing::instrument(skip(self, request), fields(name = %request.name, num_chunks = request.num_chunks))]
    pub async fn upload_file_atomic(&self, request: UploadFileAtomicRequest) -> Result<FileRecord> {
        self.write("upload_file_atomic", |txn| {
            let file_id = state_machine::allocate_file_id(&self.db, txn)?;
            let record = FileRecord::new_chunked(
                file_id,
                &request,
                get_epoch_time_in_ms(),
                self.upload_lease_secs,
            );
            state_machine::put_chunk(&self.db, txn, file_id, 0, &request.content)?;
            state_machine::put_file(&self.db, txn, &record)?;
            info!(
                file_id = file_id.get(),
                status = %record.status,
                "created chunked upload"
            );
            Ok(record)
        })
    }

    #[tracing::instrument(skip(self, request), fields(file_id = request.file_id.get(), chunk_index = request.chunk_index))]
    pub async fn upload_file_continue(
        &self,
        request: UploadFileContinueRequest,
    ) -> Result<Result<FileRecord, UploadFileError>> {
        self.write("upload_file_continue", |txn| {
            let Some(mut record) =
                state_machine::get_file_for_update(&self.db, txn, request.file_id)?
            else {
                return Ok(Err(UploadFileError::NotRequested));
            };
            if let Err(rejection) = record.accept_chunk(
                request.chunk_index,
                request.num_chunks,
                get_epoch_time_in_ms(),
                self.upload_lease_secs,
            ) {
                info!(%rejection, "rejected chunk");
                return Ok(Err(rejection));
            }
            state_machine::put_chunk(
                &self.db,
                txn,
                request.file_id,
                request.chunk_index,
                &request.content,
            )?;
            state_machine::put_file(&self.db, txn, &record)?;
            if record.is_uploaded() {
                info!("chunked upload complete");
            }
            Ok(Ok(record))
        })
    }

    #[tracing::instrument(skip(self, request), fields(file_name = %request.file_name, storage_provider = %request.storage_provider))]
    pub async fn register_file(
        &self,
        request: RegisterFileRequest,
    ) -> Result<Result<FileRecord, RegisterFileError>> {
        self.write("register_file", |txn| {
            let file_id = state_machine::allocate_file_id(&self.db, txn)?;
            let record = match FileRecord::new_registered(file_id, &request) {
                Ok(record) => record,
                Err(rejection) => return Ok(Err(rejection)),
            };
            state_machine::put_file(&self.db, txn, &record)?;
            info!(file_id = file_id.get(), status = %record.status, "registered file");
            Ok(Ok(record))
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_file(&self, file_id: FileId) -> Result<DeleteFileResult> {
        self.write("delete_file", |txn| {
            let Some(record) = state_machine::get_file_for_update(&self.db, txn, file_id)? else {
                return Ok(DeleteFileResult::NotFound);
            };
            state_machine::delete_file(&self.db, txn, &record)?;
            info!("deleted file");
            Ok(DeleteFileResult::Ok)
        })
    }

    /// Stamps the deletion intent of a record. Marking is idempotent and
    /// keeps the first timestamp.
    #[tracing::instrument(skip(self))]
    pub async fn mark_for_deletion(&self, file_id: FileId) -> Result<DeleteFileResult> {
        self.write("mark_for_deletion", |txn| {
            let Some(mut record) = state_machine::get_file_for_update(&self.db, txn, file_id)?
            else {
                return Ok(DeleteFileResult::NotFound);
            };
            if record.deletion_requested_at.is_none() {
                record.deletion_requested_at = Some(get_epoch_time_in_ms());
                state_machine::put_file(&self.db, txn, &record)?;
            }
            Ok(DeleteFileResult::Ok)
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn abort_upload(&self, file_id: FileId) -> Result<AbortUploadResult> {
        self.write("abort_upload", |txn| {
            let Some(record) = state_machine::get_file_for_update(&self.db, txn, file_id)? else {
                return Ok(AbortUploadResult::NotFound);
            };
            if record.is_uploaded() {
                return Ok(AbortUploadResult::AlreadyUploaded);
            }
            state_machine::delete_file(&self.db, txn, &record)?;
            info!(chunks_received = record.chunks_received, "aborted upload");
            Ok(AbortUploadResult::Ok)
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn share_file(
        &self,
        caller: Option<&Principal>,
        file_id: FileId,
        principal: Principal,
    ) -> Result<FileSharingResponse> {
        self.write("share_file", |txn| {
            let Some(mut record) = state_machine::get_file_for_update(&self.db, txn, file_id)?
            else {
                return Ok(FileSharingResponse::NotFound);
            };
            if record.is_marked_for_deletion() {
                return Ok(FileSharingResponse::NotFound);
            }
            let response = record.share_with(caller, principal);
            if response == FileSharingResponse::Ok {
                state_machine::put_file(&self.db, txn, &record)?;
            }
            Ok(response)
        })
    }

    /// Deletes partial uploads whose lease expired at or before `now`.
    /// Each candidate is re-checked under its row lock, so an upload that
    /// received a chunk after the scan survives.
    pub async fn reap_expired_uploads(&self, now: u64) -> Result<Vec<FileId>> {
        let candidates = self.reader().expired_uploads(now)?;
        let mut reaped = Vec::new();
        for candidate in candidates {
            let removed = self.write("reap_expired_upload", |txn| {
                match state_machine::get_file_for_update(&self.db, txn, candidate.file_id)? {
                    Some(record) if record.lease_expired(now) => {
                        state_machine::delete_file(&self.db, txn, &record)?;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            })?;
            if removed {
                info!(
                    file_id = candidate.file_id.get(),
                    "reaped expired upload"
                );
                reaped.push(candidate.file_id);
            }
        }
        Ok(reaped)
    }
}
