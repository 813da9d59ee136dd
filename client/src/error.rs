use data_model::{ChunkIndex, FileDownloadResponse, FileId, UploadFileError};
use thiserror::Error;

/// Terminal failure of a client operation. Nothing is retried and chunks
/// accepted before the failure stay on the backend.
#[derive(Debug, Error)]
pub enum FileVaultError {
    #[error("payload of {size} bytes exceeds the upload limit of {limit} bytes")]
    SizeExceeded { size: usize, limit: usize },

    #[error("no upload in progress for this file")]
    NotRequested,

    #[error("file is already uploaded")]
    AlreadyUploaded,

    #[error("out of order chunk: expected {expected}, received {received}")]
    OutOfOrderChunk {
        expected: ChunkIndex,
        received: ChunkIndex,
    },

    #[error("declared {declared} chunks, request carried {received}")]
    ChunkCountMismatch { declared: u64, received: u64 },

    #[error("caller may not access this file")]
    PermissionError,

    #[error("file not found")]
    NotFoundFile,

    #[error("file is not fully uploaded")]
    NotUploadedFile,

    #[error("file {0} not found")]
    NotFound(FileId),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("file {0} has no blob reference")]
    MissingBlobReference(FileId),

    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<reqwest::Error> for FileVaultError {
    fn from(error: reqwest::Error) -> Self {
        FileVaultError::BackendUnavailable(error.to_string())
    }
}

impl From<UploadFileError> for FileVaultError {
    fn from(error: UploadFileError) -> Self {
        match error {
            UploadFileError::NotRequested => FileVaultError::NotRequested,
            UploadFileError::AlreadyUploaded => FileVaultError::AlreadyUploaded,
            UploadFileError::OutOfOrderChunk { expected, received } => {
                FileVaultError::OutOfOrderChunk { expected, received }
            }
            UploadFileError::ChunkCountMismatch { declared, received } => {
                FileVaultError::ChunkCountMismatch { declared, received }
            }
        }
    }
}

impl FileVaultError {
    /// Content store failures surface as an unavailable backend.
    pub fn content_store(error: anyhow::Error) -> Self {
        FileVaultError::BackendUnavailable(format!("content store: {:#}", error))
    }

    /// Error for a download rejection. `FoundFile` is not a rejection and
    /// maps to `None`.
    pub fn from_download(response: &FileDownloadResponse) -> Option<Self> {
        match response {
            FileDownloadResponse::NotFoundFile => Some(FileVaultError::NotFoundFile),
            FileDownloadResponse::NotUploadedFile => Some(FileVaultError::NotUploadedFile),
            FileDownloadResponse::PermissionError => Some(FileVaultError::PermissionError),
            FileDownloadResponse::FoundFile(_) => None,
        }
    }
}
