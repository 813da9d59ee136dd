use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use data_model::{
    BlobId,
    FileDownloadResponse,
    FileRecord,
    FileStatus,
    Principal,
    RegisterFileError,
    RegisterFileRequest,
    StorageProvider,
    UploadFileError,
    DEFAULT_FILE_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};

/// Body of every rejected request. Chunk upload rejections carry the
/// fields of the rejection next to `error`.
#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub struct FileVaultAPIError {
    status_code: StatusCode,
    body: Map<String, Value>,
}

impl FileVaultAPIError {
    pub fn new(status_code: StatusCode, error: &str, message: &str) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::from(error));
        body.insert("message".to_string(), Value::from(message));
        Self { status_code, body }
    }

    pub fn internal_error(e: anyhow::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string())
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn permission_error(message: &str) -> Self {
        Self::new(StatusCode::FORBIDDEN, "permission_error", message)
    }

    pub fn conflict(error: &str, message: &str) -> Self {
        Self::new(StatusCode::CONFLICT, error, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

impl From<UploadFileError> for FileVaultAPIError {
    fn from(rejection: UploadFileError) -> Self {
        let status_code = match rejection {
            UploadFileError::NotRequested => StatusCode::NOT_FOUND,
            UploadFileError::AlreadyUploaded |
            UploadFileError::OutOfOrderChunk { .. } |
            UploadFileError::ChunkCountMismatch { .. } => StatusCode::CONFLICT,
        };
        let mut body = match serde_json::to_value(&rejection) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        body.insert("message".to_string(), Value::from(rejection.to_string()));
        Self { status_code, body }
    }
}

impl From<RegisterFileError> for FileVaultAPIError {
    fn from(rejection: RegisterFileError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_registration",
            &rejection.to_string(),
        )
    }
}

impl From<FileDownloadResponse> for FileVaultAPIError {
    fn from(rejection: FileDownloadResponse) -> Self {
        match rejection {
            FileDownloadResponse::PermissionError => {
                Self::permission_error("caller may not read this file")
            }
            FileDownloadResponse::NotUploadedFile => Self::conflict(
                "not_uploaded_file",
                "file has not been fully uploaded",
            ),
            FileDownloadResponse::NotFoundFile | FileDownloadResponse::FoundFile(_) => Self::new(
                StatusCode::NOT_FOUND,
                "not_found_file",
                "file or chunk not found",
            ),
        }
    }
}

impl IntoResponse for FileVaultAPIError {
    fn into_response(self) -> Response {
        if self.status_code.is_server_error() {
            error!("API Error: {} - {:?}", self.status_code, self.body);
        } else {
            info!("request rejected: {} - {:?}", self.status_code, self.body);
        }
        (self.status_code, Json(Value::Object(self.body))).into_response()
    }
}

impl From<serde_json::Error> for FileVaultAPIError {
    fn from(e: serde_json::Error) -> Self {
        Self::bad_request(&e.to_string())
    }
}

/// Catalog entry as served by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileMetadata {
    pub file_id: u64,
    pub file_name: String,
    pub file_type: String,
    #[schema(value_type = String)]
    pub file_status: FileStatus,
    #[schema(value_type = String)]
    pub storage_provider: StorageProvider,
    pub blob_id: Option<String>,
    pub num_chunks: u64,
    pub requested_at: u64,
    pub uploaded_at: Option<u64>,
    pub shared_with: Vec<String>,
    pub deletion_requested_at: Option<u64>,
}

impl From<FileRecord> for FileMetadata {
    fn from(record: FileRecord) -> Self {
        Self {
            file_id: record.file_id.get(),
            file_name: record.file_name,
            file_type: record.file_type,
            file_status: record.status,
            storage_provider: record.storage_provider,
            blob_id: record.blob_id.map(|blob_id| blob_id.get().to_string()),
            num_chunks: record.num_chunks,
            requested_at: record.requested_at,
            uploaded_at: record.uploaded_at,
            shared_with: record
                .shared_with
                .into_iter()
                .map(|principal| principal.get().to_string())
                .collect(),
            deletion_requested_at: record.deletion_requested_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListFilesResponse {
    pub files: Vec<FileMetadata>,
}

/// Query of the atomic upload: the name and declared shape of the file,
/// whose first chunk is the request body.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadFileParams {
    pub name: String,
    pub file_type: Option<String>,
    pub num_chunks: Option<u64>,
}

impl UploadFileParams {
    pub fn file_type(&self) -> String {
        self.file_type
            .clone()
            .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadChunkParams {
    pub file_type: Option<String>,
    pub num_chunks: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileIdResponse {
    pub file_id: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadChunkResponse {
    pub file_id: u64,
    pub chunks_received: u64,
    #[schema(value_type = String)]
    pub file_status: FileStatus,
}

impl From<&FileRecord> for UploadChunkResponse {
    fn from(record: &FileRecord) -> Self {
        Self {
            file_id: record.file_id.get(),
            chunks_received: record.chunks_received,
            file_status: record.status,
        }
    }
}

/// Registration of a file whose bytes already live elsewhere, or will.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterFile {
    pub file_name: String,
    #[schema(value_type = String)]
    pub storage_provider: StorageProvider,
    #[serde(default)]
    pub blob_id: Option<String>,
    #[serde(default)]
    pub file_type: Option<String>,
    pub requested_at: u64,
    #[serde(default)]
    pub uploaded_at: Option<u64>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl RegisterFile {
    /// An identified caller always owns the record. The body may name an
    /// owner only for anonymous registrations.
    pub fn into_request(self, caller: Option<Principal>) -> RegisterFileRequest {
        RegisterFileRequest {
            file_name: self.file_name,
            storage_provider: self.storage_provider,
            blob_id: self.blob_id.map(BlobId::new),
            file_type: self.file_type,
            requested_at: self.requested_at,
            uploaded_at: self.uploaded_at,
            owner: caller.or_else(|| self.owner.map(Principal::new)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShareFileRequest {
    pub principal: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PutBlobParams {
    /// Accepted for publisher compatibility, the development store keeps
    /// blobs until they are deleted.
    pub epochs: Option<u32>,
}
