pub mod chunker;
pub mod config;
pub mod coordinator;
pub mod deletion;
pub mod error;
pub mod registration;
pub mod remote_store;
pub mod retrieval;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use blob_store::{ContentStore, HttpContentStore};
use data_model::{
    AbortUploadResult,
    DeleteFileResult,
    FileId,
    FileSharingResponse,
    Principal,
    PublicFileMetadata,
};
pub use error::FileVaultError;
use tokio::sync::watch;

use crate::{
    config::ClientConfig,
    coordinator::{UploadCoordinator, UploadRequest},
    deletion::DeletionDispatcher,
    remote_store::{HttpPrimaryBackend, PrimaryBackend},
    retrieval::{DownloadedFile, RetrievalDispatcher},
};

/// Client facade over both backends.
pub struct FileVault {
    backend: Arc<dyn PrimaryBackend>,
    coordinator: UploadCoordinator,
    retrieval: RetrievalDispatcher,
    deletion: DeletionDispatcher,
}

impl FileVault {
    pub fn new(
        config: &ClientConfig,
        backend: Arc<dyn PrimaryBackend>,
        content_store: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            coordinator: UploadCoordinator::new(
                backend.clone(),
                content_store.clone(),
                config.chunk_size,
                config.max_upload_size,
            ),
            retrieval: RetrievalDispatcher::new(backend.clone(), content_store.clone()),
            deletion: DeletionDispatcher::new(backend.clone(), content_store),
            backend,
        }
    }

    /// Client wired to `filevault-server` and an HTTP content store.
    pub fn from_config(config: &ClientConfig) -> Result<Self, FileVaultError> {
        config.validate()?;
        let backend = HttpPrimaryBackend::new(
            &config.backend_url,
            config.principal.clone(),
            config.request_timeout(),
        )?;
        let content_store = HttpContentStore::new(
            &config.content_store.publisher_url,
            &config.content_store.aggregator_url,
            config.content_store.epochs,
            config.request_timeout(),
        )
        .map_err(|e| FileVaultError::InvalidConfig(e.to_string()))?;
        Ok(Self::new(config, Arc::new(backend), Arc::new(content_store)))
    }

    pub async fn upload(
        &self,
        request: UploadRequest,
        progress: &watch::Sender<u8>,
    ) -> Result<FileId, FileVaultError> {
        self.coordinator.upload(request, progress).await
    }

    pub async fn list(&self) -> Result<Vec<PublicFileMetadata>, FileVaultError> {
        self.backend.list_files().await
    }

    pub async fn download(&self, file_id: FileId) -> Result<DownloadedFile, FileVaultError> {
        let file = self
            .backend
            .get_file(file_id)
            .await?
            .ok_or(FileVaultError::NotFound(file_id))?;
        if file.deletion_requested_at.is_some() {
            return Err(FileVaultError::NotFoundFile);
        }
        self.retrieval.download(&file).await
    }

    /// Deletes the file. Files already marked for deletion are picked up
    /// again so an interrupted deletion can be finished.
    pub async fn delete(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError> {
        match self.backend.get_file(file_id).await? {
            Some(file) => self.deletion.delete(&file).await,
            None => Ok(DeleteFileResult::NotFound),
        }
    }

    pub async fn abort(&self, file_id: FileId) -> Result<AbortUploadResult, FileVaultError> {
        self.backend.abort_upload(file_id).await
    }

    pub async fn share(
        &self,
        file_id: FileId,
        principal: Principal,
    ) -> Result<FileSharingResponse, FileVaultError> {
        self.backend.share_file(file_id, principal).await
    }
}
