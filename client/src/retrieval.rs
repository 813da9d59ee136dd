use std::sync::Arc;

use blob_store::ContentStore;
use bytes::{Bytes, BytesMut};
use data_model::{FileData, FileDownloadResponse, FileId, PublicFileMetadata, StorageProvider};
use tracing::debug;

use crate::{error::FileVaultError, remote_store::PrimaryBackend};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub contents: Bytes,
    pub file_type: String,
    pub file_name: String,
}

/// Reads a file back from whichever backend holds its bytes.
pub struct RetrievalDispatcher {
    backend: Arc<dyn PrimaryBackend>,
    content_store: Arc<dyn ContentStore>,
}

impl RetrievalDispatcher {
    pub fn new(backend: Arc<dyn PrimaryBackend>, content_store: Arc<dyn ContentStore>) -> Self {
        Self {
            backend,
            content_store,
        }
    }

    pub async fn download(&self, file: &PublicFileMetadata) -> Result<DownloadedFile, FileVaultError> {
        let contents = match file.storage_provider {
            StorageProvider::PrimaryChunked => self.download_chunks(file.file_id).await?,
            StorageProvider::SecondaryBlob => {
                let blob_id = file
                    .blob_id
                    .as_ref()
                    .ok_or(FileVaultError::MissingBlobReference(file.file_id))?;
                self.content_store
                    .get(blob_id)
                    .await
                    .map_err(FileVaultError::content_store)?
                    .ok_or(FileVaultError::NotFoundFile)?
            }
        };
        Ok(DownloadedFile {
            contents,
            file_type: file.file_type.clone(),
            file_name: file.file_name.clone(),
        })
    }

    /// Chunk 0 declares the chunk count, the rest are read one at a time and
    /// appended in order.
    async fn download_chunks(&self, file_id: FileId) -> Result<Bytes, FileVaultError> {
        let first = self.chunk(file_id, 0).await?;
        if first.num_chunks <= 1 {
            return Ok(first.contents);
        }
        let mut contents = BytesMut::from(first.contents.as_ref());
        for chunk_index in 1..first.num_chunks {
            let chunk = self.chunk(file_id, chunk_index).await?;
            contents.extend_from_slice(&chunk.contents);
        }
        debug!(
            file_id = file_id.get(),
            num_chunks = first.num_chunks,
            size = contents.len(),
            "reassembled file"
        );
        Ok(contents.freeze())
    }

    async fn chunk(
        &self,
        file_id: FileId,
        chunk_index: u64,
    ) -> Result<FileData, FileVaultError> {
        match self.backend.download_file(file_id, chunk_index).await? {
            FileDownloadResponse::FoundFile(data) => Ok(data),
            rejection => Err(FileVaultError::from_download(&rejection)
                .unwrap_or(FileVaultError::NotFoundFile)),
        }
    }
}

#[cfg(test)]
mod tests {
    use data_model::{test_objects::tests::mock_blob_registration, UploadFileAtomicRequest};
    use tokio::sync::watch;

    use super::*;
    use crate::{
        coordinator::{UploadCoordinator, UploadRequest},
        testing::{InMemoryContentStore, RecordingBackend},
    };

    async fn metadata(backend: &RecordingBackend, file_id: FileId) -> PublicFileMetadata {
        backend.get_file(file_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_multi_chunk_round_trip() {
        let backend = Arc::new(RecordingBackend::default());
        let store = Arc::new(InMemoryContentStore::default());
        let coordinator =
            UploadCoordinator::new(backend.clone(), store.clone(), 4, data_model::MAX_UPLOAD_SIZE);
        let (progress, _) = watch::channel(0);
        let payload = Bytes::from_static(b"the quick brown fox");
        let file_id = coordinator
            .upload(
                UploadRequest {
                    file_name: "fox.txt".to_string(),
                    file_type: "text/plain".to_string(),
                    contents: payload.clone(),
                    storage_provider: StorageProvider::PrimaryChunked,
                },
                &progress,
            )
            .await
            .unwrap();

        let retrieval = RetrievalDispatcher::new(backend.clone(), store);
        let file = metadata(&backend, file_id).await;
        let downloaded = retrieval.download(&file).await.unwrap();
        assert_eq!(downloaded.contents, payload);
        assert_eq!(downloaded.file_type, "text/plain");
        assert_eq!(downloaded.file_name, "fox.txt");
    }

    #[tokio::test]
    async fn test_partial_upload_is_not_downloadable() {
        let backend = Arc::new(RecordingBackend::default());
        let store = Arc::new(InMemoryContentStore::default());
        let file_id = backend
            .upload_file_atomic(UploadFileAtomicRequest {
                name: "half.bin".to_string(),
                content: Bytes::from_static(b"half"),
                file_type: "application/octet-stream".to_string(),
                num_chunks: 2,
                owner: None,
            })
            .await
            .unwrap();

        let retrieval = RetrievalDispatcher::new(backend.clone(), store);
        let file = metadata(&backend, file_id).await;
        assert!(matches!(
            retrieval.download(&file).await,
            Err(FileVaultError::NotUploadedFile)
        ));
    }

    #[tokio::test]
    async fn test_blob_download_goes_to_content_store() {
        let backend = Arc::new(RecordingBackend::default());
        let store = Arc::new(InMemoryContentStore::default());
        let blob_id = store.put(Bytes::from_static(b"blob bytes")).await.unwrap();
        let file_id = backend
            .register_file(mock_blob_registration("a.txt", blob_id.get(), Some(1000)))
            .await
            .unwrap();

        let retrieval = RetrievalDispatcher::new(backend.clone(), store);
        let file = metadata(&backend, file_id).await;
        let downloaded = retrieval.download(&file).await.unwrap();
        assert_eq!(downloaded.contents, Bytes::from_static(b"blob bytes"));
        assert!(backend
            .calls()
            .iter()
            .all(|call| !matches!(call, crate::testing::BackendCall::Download { .. })));

        let mut dangling = file.clone();
        dangling.blob_id = None;
        assert!(matches!(
            retrieval.download(&dangling).await,
            Err(FileVaultError::MissingBlobReference(_))
        ));
    }
}
