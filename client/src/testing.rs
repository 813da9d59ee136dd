use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use anyhow::Result;
use async_trait::async_trait;
use blob_store::{content_address, ContentStore};
use bytes::Bytes;
use data_model::{
    AbortUploadResult,
    BlobId,
    ChunkIndex,
    DeleteFileResult,
    FileData,
    FileDownloadResponse,
    FileId,
    FileRecord,
    FileSharingResponse,
    Principal,
    PublicFileMetadata,
    RegisterFileRequest,
    UploadFileAtomicRequest,
    UploadFileContinueRequest,
    UploadFileError,
};

use crate::{error::FileVaultError, remote_store::PrimaryBackend};

const TEST_LEASE_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Register,
    UploadAtomic { num_chunks: u64 },
    UploadContinue { file_id: FileId, chunk_index: ChunkIndex },
    Download { file_id: FileId, chunk_index: ChunkIndex },
    Delete(FileId),
    MarkForDeletion(FileId),
    List,
    GetFile(FileId),
    Abort(FileId),
    Share(FileId),
}

#[derive(Default)]
struct BackendState {
    next_file_id: u64,
    records: BTreeMap<FileId, FileRecord>,
    chunks: BTreeMap<(FileId, ChunkIndex), Bytes>,
    calls: Vec<BackendCall>,
    reject_chunk: Option<ChunkIndex>,
}

/// In-process primary backend that applies the catalog rules and records
/// every call it receives.
#[derive(Default)]
pub struct RecordingBackend {
    state: Mutex<BackendState>,
}

impl RecordingBackend {
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn record(&self, file_id: FileId) -> Option<FileRecord> {
        self.state.lock().unwrap().records.get(&file_id).cloned()
    }

    pub fn stored_bytes(&self, file_id: FileId) -> Bytes {
        let state = self.state.lock().unwrap();
        let mut contents = Vec::new();
        for ((id, _), chunk) in state.chunks.iter() {
            if *id == file_id {
                contents.extend_from_slice(chunk);
            }
        }
        Bytes::from(contents)
    }

    /// Makes the continuation carrying `chunk_index` fail with
    /// `already_uploaded`.
    pub fn reject_chunk(&self, chunk_index: ChunkIndex) {
        self.state.lock().unwrap().reject_chunk = Some(chunk_index);
    }

    fn allocate(state: &mut BackendState) -> FileId {
        let file_id = FileId::new(state.next_file_id);
        state.next_file_id += 1;
        file_id
    }
}

#[async_trait]
impl PrimaryBackend for RecordingBackend {
    async fn register_file(&self, request: RegisterFileRequest) -> Result<FileId, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Register);
        let file_id = Self::allocate(&mut state);
        let record = FileRecord::new_registered(file_id, &request)
            .map_err(|e| FileVaultError::InvalidRegistration(e.to_string()))?;
        state.records.insert(file_id, record);
        Ok(file_id)
    }

    async fn upload_file_atomic(
        &self,
        request: UploadFileAtomicRequest,
    ) -> Result<FileId, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::UploadAtomic {
            num_chunks: request.num_chunks,
        });
        let file_id = Self::allocate(&mut state);
        let record = FileRecord::new_chunked(file_id, &request, 0, TEST_LEASE_SECS);
        state.records.insert(file_id, record);
        state.chunks.insert((file_id, 0), request.content);
        Ok(file_id)
    }

    async fn upload_file_continue(
        &self,
        request: UploadFileContinueRequest,
    ) -> Result<(), FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::UploadContinue {
            file_id: request.file_id,
            chunk_index: request.chunk_index,
        });
        if state.reject_chunk == Some(request.chunk_index) {
            return Err(UploadFileError::AlreadyUploaded.into());
        }
        let record = state
            .records
            .get_mut(&request.file_id)
            .ok_or(FileVaultError::NotRequested)?;
        record.accept_chunk(request.chunk_index, request.num_chunks, 0, TEST_LEASE_SECS)?;
        state
            .chunks
            .insert((request.file_id, request.chunk_index), request.content);
        Ok(())
    }

    async fn download_file(
        &self,
        file_id: FileId,
        chunk_index: ChunkIndex,
    ) -> Result<FileDownloadResponse, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Download {
            file_id,
            chunk_index,
        });
        let Some(record) = state.records.get(&file_id) else {
            return Ok(FileDownloadResponse::NotFoundFile);
        };
        if let Err(rejection) = record.check_download(None, chunk_index) {
            return Ok(rejection);
        }
        let contents = state
            .chunks
            .get(&(file_id, chunk_index))
            .cloned()
            .unwrap_or_default();
        Ok(FileDownloadResponse::FoundFile(FileData {
            contents,
            file_type: record.file_type.clone(),
            num_chunks: record.num_chunks,
        }))
    }

    async fn delete_file(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Delete(file_id));
        if state.records.remove(&file_id).is_none() {
            return Ok(DeleteFileResult::NotFound);
        }
        state.chunks.retain(|(id, _), _| *id != file_id);
        Ok(DeleteFileResult::Ok)
    }

    async fn list_files(&self) -> Result<Vec<PublicFileMetadata>, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::List);
        Ok(state
            .records
            .values()
            .filter(|record| !record.is_marked_for_deletion())
            .cloned()
            .map(PublicFileMetadata::from)
            .collect())
    }

    async fn get_file(&self, file_id: FileId) -> Result<Option<PublicFileMetadata>, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::GetFile(file_id));
        Ok(state
            .records
            .get(&file_id)
            .cloned()
            .map(PublicFileMetadata::from))
    }

    async fn abort_upload(&self, file_id: FileId) -> Result<AbortUploadResult, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Abort(file_id));
        let uploaded = match state.records.get(&file_id) {
            None => return Ok(AbortUploadResult::NotFound),
            Some(record) => record.is_uploaded(),
        };
        if uploaded {
            return Ok(AbortUploadResult::AlreadyUploaded);
        }
        state.records.remove(&file_id);
        state.chunks.retain(|(id, _), _| *id != file_id);
        Ok(AbortUploadResult::Ok)
    }

    async fn mark_for_deletion(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::MarkForDeletion(file_id));
        match state.records.get_mut(&file_id) {
            None => Ok(DeleteFileResult::NotFound),
            Some(record) => {
                record.deletion_requested_at.get_or_insert(0);
                Ok(DeleteFileResult::Ok)
            }
        }
    }

    async fn share_file(
        &self,
        file_id: FileId,
        principal: Principal,
    ) -> Result<FileSharingResponse, FileVaultError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BackendCall::Share(file_id));
        match state.records.get_mut(&file_id) {
            None => Ok(FileSharingResponse::NotFound),
            Some(record) => Ok(record.share_with(None, principal)),
        }
    }
}

/// Content store kept in memory, addressed like the object store backed
/// one.
#[derive(Default)]
pub struct InMemoryContentStore {
    blobs: Mutex<HashMap<BlobId, Bytes>>,
}

impl InMemoryContentStore {
    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, content: Bytes) -> Result<BlobId> {
        let blob_id = content_address(&content);
        self.blobs.lock().unwrap().insert(blob_id.clone(), content);
        Ok(blob_id)
    }

    async fn get(&self, blob_id: &BlobId) -> Result<Option<Bytes>> {
        Ok(self.blobs.lock().unwrap().get(blob_id).cloned())
    }

    async fn delete(&self, blob_id: &BlobId) -> Result<bool> {
        Ok(self.blobs.lock().unwrap().remove(blob_id).is_some())
    }
}
