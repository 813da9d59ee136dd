use blob_store::ContentStore;
use bytes::Bytes;
use data_model::{FileId, RegisterFileRequest, StorageProvider};
use filevault_utils::get_epoch_time_in_ms;
use tracing::info;

use crate::{error::FileVaultError, remote_store::PrimaryBackend};

/// Stores `contents` in the content store, then registers a catalog record
/// pointing at the resulting blob. The record is created as uploaded since
/// the blob write already succeeded.
pub async fn register_blob(
    backend: &dyn PrimaryBackend,
    content_store: &dyn ContentStore,
    file_name: &str,
    file_type: &str,
    contents: Bytes,
) -> Result<FileId, FileVaultError> {
    let requested_at = get_epoch_time_in_ms();
    let blob_id = content_store
        .put(contents)
        .await
        .map_err(FileVaultError::content_store)?;
    let file_id = backend
        .register_file(RegisterFileRequest {
            file_name: file_name.to_string(),
            storage_provider: StorageProvider::SecondaryBlob,
            blob_id: Some(blob_id.clone()),
            file_type: Some(file_type.to_string()),
            requested_at,
            uploaded_at: Some(get_epoch_time_in_ms()),
            owner: None,
        })
        .await?;
    info!(file_id = file_id.get(), %blob_id, "registered blob");
    Ok(file_id)
}
