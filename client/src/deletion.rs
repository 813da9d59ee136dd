use std::sync::Arc;

use blob_store::ContentStore;
use data_model::{DeleteFileResult, PublicFileMetadata, StorageProvider};
use tracing::{info, warn};

use crate::{error::FileVaultError, remote_store::PrimaryBackend};

pub struct DeletionDispatcher {
    backend: Arc<dyn PrimaryBackend>,
    content_store: Arc<dyn ContentStore>,
}

impl DeletionDispatcher {
    pub fn new(backend: Arc<dyn PrimaryBackend>, content_store: Arc<dyn ContentStore>) -> Self {
        Self {
            backend,
            content_store,
        }
    }

    /// Deletes the file and its bytes.
    ///
    /// Blob-backed files go through a deletion intent first: the record is
    /// marked, the blob removed, and only then the record deleted. A run that
    /// stops half way can be repeated to finish the deletion.
    pub async fn delete(&self, file: &PublicFileMetadata) -> Result<DeleteFileResult, FileVaultError> {
        match file.storage_provider {
            StorageProvider::PrimaryChunked => self.backend.delete_file(file.file_id).await,
            StorageProvider::SecondaryBlob => {
                let blob_id = file
                    .blob_id
                    .as_ref()
                    .ok_or(FileVaultError::MissingBlobReference(file.file_id))?;
                if self.backend.mark_for_deletion(file.file_id).await? == DeleteFileResult::NotFound {
                    return Ok(DeleteFileResult::NotFound);
                }
                let existed = self
                    .content_store
                    .delete(blob_id)
                    .await
                    .map_err(FileVaultError::content_store)?;
                if !existed {
                    warn!(file_id = file.file_id.get(), %blob_id, "blob was already gone");
                }
                let result = self.backend.delete_file(file.file_id).await?;
                info!(file_id = file.file_id.get(), %blob_id, "deleted blob-backed file");
                Ok(result)
            }
        }
    }
}
