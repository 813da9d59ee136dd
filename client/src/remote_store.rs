use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use data_model::{
    AbortUploadResult,
    ChunkIndex,
    DeleteFileResult,
    FileData,
    FileDownloadResponse,
    FileId,
    FileSharingResponse,
    Principal,
    PublicFileMetadata,
    RegisterFileRequest,
    RegisterFileResponse,
    UploadFileAtomicRequest,
    UploadFileContinueRequest,
    UploadFileError,
    DEFAULT_FILE_TYPE,
    NUM_CHUNKS_HEADER,
    PRINCIPAL_HEADER,
};
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FileVaultError;

/// Remote file store with a persistent catalog: the primary backend.
#[async_trait]
pub trait PrimaryBackend: Send + Sync {
    async fn register_file(&self, request: RegisterFileRequest) -> Result<FileId, FileVaultError>;

    async fn upload_file_atomic(
        &self,
        request: UploadFileAtomicRequest,
    ) -> Result<FileId, FileVaultError>;

    async fn upload_file_continue(
        &self,
        request: UploadFileContinueRequest,
    ) -> Result<(), FileVaultError>;

    async fn download_file(
        &self,
        file_id: FileId,
        chunk_index: ChunkIndex,
    ) -> Result<FileDownloadResponse, FileVaultError>;

    async fn delete_file(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError>;

    async fn list_files(&self) -> Result<Vec<PublicFileMetadata>, FileVaultError>;

    /// Metadata of a single record, including records marked for deletion.
    async fn get_file(&self, file_id: FileId) -> Result<Option<PublicFileMetadata>, FileVaultError>;

    async fn abort_upload(&self, file_id: FileId) -> Result<AbortUploadResult, FileVaultError>;

    async fn mark_for_deletion(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError>;

    async fn share_file(
        &self,
        file_id: FileId,
        principal: Principal,
    ) -> Result<FileSharingResponse, FileVaultError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListFilesResponse {
    files: Vec<PublicFileMetadata>,
}

#[derive(Debug, Serialize)]
struct ShareFileRequest<'a> {
    principal: &'a Principal,
}

/// A rejection the server answered with, kept raw until the caller decides
/// which closed enum it belongs to.
struct Rejection {
    status: StatusCode,
    body: Bytes,
    error: ErrorBody,
}

impl Rejection {
    fn tag(&self) -> &str {
        &self.error.error
    }

    fn unexpected(self) -> FileVaultError {
        FileVaultError::BackendUnavailable(format!(
            "{}: {} {}",
            self.status, self.error.error, self.error.message
        ))
    }
}

/// [`PrimaryBackend`] speaking to `filevault-server` over HTTP.
pub struct HttpPrimaryBackend {
    client: Client,
    base_url: String,
    principal: Option<Principal>,
}

impl HttpPrimaryBackend {
    pub fn new(
        base_url: &str,
        principal: Option<Principal>,
        timeout: Duration,
    ) -> Result<Self, FileVaultError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FileVaultError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            principal,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.principal {
            Some(principal) => builder.header(PRINCIPAL_HEADER, principal.get()),
            None => builder,
        }
    }

    /// Sends the request and splits the response into success and
    /// rejection.
    async fn send(&self, builder: RequestBuilder) -> Result<Result<Response, Rejection>, FileVaultError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response));
        }
        let body = response.bytes().await?;
        let error = serde_json::from_slice::<ErrorBody>(&body).unwrap_or_else(|_| ErrorBody {
            error: "unknown".to_string(),
            message: String::from_utf8_lossy(&body).into_owned(),
        });
        debug!(%status, error = %error.error, "request rejected");
        Ok(Err(Rejection {
            status,
            body,
            error,
        }))
    }
}

#[async_trait]
impl PrimaryBackend for HttpPrimaryBackend {
    async fn register_file(&self, request: RegisterFileRequest) -> Result<FileId, FileVaultError> {
        let builder = self
            .request(reqwest::Method::POST, "/files/register")
            .json(&request);
        match self.send(builder).await? {
            Ok(response) => Ok(response.json::<RegisterFileResponse>().await?.file_id),
            Err(rejection) if rejection.tag() == "invalid_registration" => {
                Err(FileVaultError::InvalidRegistration(rejection.error.message))
            }
            Err(rejection) => Err(rejection.unexpected()),
        }
    }

    async fn upload_file_atomic(
        &self,
        request: UploadFileAtomicRequest,
    ) -> Result<FileId, FileVaultError> {
        let builder = self
            .request(reqwest::Method::POST, "/files")
            .query(&[
                ("name", request.name.as_str()),
                ("file_type", request.file_type.as_str()),
            ])
            .query(&[("num_chunks", request.num_chunks)])
            .body(request.content);
        match self.send(builder).await? {
            Ok(response) => Ok(response.json::<RegisterFileResponse>().await?.file_id),
            Err(rejection) => Err(rejection.unexpected()),
        }
    }

    async fn upload_file_continue(
        &self,
        request: UploadFileContinueRequest,
    ) -> Result<(), FileVaultError> {
        let path = format!("/files/{}/chunks/{}", request.file_id, request.chunk_index);
        let builder = self
            .request(reqwest::Method::PUT, &path)
            .query(&[("file_type", request.file_type.as_str())])
            .query(&[("num_chunks", request.num_chunks)])
            .body(request.content);
        match self.send(builder).await? {
            Ok(_) => Ok(()),
            Err(rejection) => match serde_json::from_slice::<UploadFileError>(&rejection.body) {
                Ok(error) => Err(error.into()),
                Err(_) => Err(rejection.unexpected()),
            },
        }
    }

    async fn download_file(
        &self,
        file_id: FileId,
        chunk_index: ChunkIndex,
    ) -> Result<FileDownloadResponse, FileVaultError> {
        let path = format!("/files/{}/chunks/{}", file_id, chunk_index);
        let builder = self.request(reqwest::Method::GET, &path);
        let response = match self.send(builder).await? {
            Ok(response) => response,
            Err(rejection) => {
                return match rejection.tag() {
                    "not_found_file" => Ok(FileDownloadResponse::NotFoundFile),
                    "not_uploaded_file" => Ok(FileDownloadResponse::NotUploadedFile),
                    "permission_error" => Ok(FileDownloadResponse::PermissionError),
                    _ => Err(rejection.unexpected()),
                }
            }
        };
        let file_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(DEFAULT_FILE_TYPE)
            .to_string();
        let num_chunks = response
            .headers()
            .get(NUM_CHUNKS_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| {
                FileVaultError::BackendUnavailable(format!(
                    "download response is missing the {} header",
                    NUM_CHUNKS_HEADER
                ))
            })?;
        let contents = response.bytes().await?;
        Ok(FileDownloadResponse::FoundFile(FileData {
            contents,
            file_type,
            num_chunks,
        }))
    }

    async fn delete_file(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError> {
        let builder = self.request(reqwest::Method::DELETE, &format!("/files/{}", file_id));
        match self.send(builder).await? {
            Ok(_) => Ok(DeleteFileResult::Ok),
            Err(rejection) if rejection.tag() == "not_found" => Ok(DeleteFileResult::NotFound),
            Err(rejection) => Err(rejection.unexpected()),
        }
    }

    async fn list_files(&self) -> Result<Vec<PublicFileMetadata>, FileVaultError> {
        let builder = self.request(reqwest::Method::GET, "/files");
        match self.send(builder).await? {
            Ok(response) => Ok(response.json::<ListFilesResponse>().await?.files),
            Err(rejection) => Err(rejection.unexpected()),
        }
    }

    async fn get_file(&self, file_id: FileId) -> Result<Option<PublicFileMetadata>, FileVaultError> {
        let builder = self.request(reqwest::Method::GET, &format!("/files/{}", file_id));
        match self.send(builder).await? {
            Ok(response) => Ok(Some(response.json::<PublicFileMetadata>().await?)),
            Err(rejection) if rejection.tag() == "not_found" => Ok(None),
            Err(rejection) if rejection.tag() == "permission_error" => {
                Err(FileVaultError::PermissionError)
            }
            Err(rejection) => Err(rejection.unexpected()),
        }
    }

    async fn abort_upload(&self, file_id: FileId) -> Result<AbortUploadResult, FileVaultError> {
        let builder = self.request(reqwest::Method::POST, &format!("/files/{}/abort", file_id));
        match self.send(builder).await? {
            Ok(_) => Ok(AbortUploadResult::Ok),
            Err(rejection) => match rejection.tag() {
                "not_found" => Ok(AbortUploadResult::NotFound),
                "already_uploaded" => Ok(AbortUploadResult::AlreadyUploaded),
                _ => Err(rejection.unexpected()),
            },
        }
    }

    async fn mark_for_deletion(&self, file_id: FileId) -> Result<DeleteFileResult, FileVaultError> {
        let builder = self.request(reqwest::Method::POST, &format!("/files/{}/deletion", file_id));
        match self.send(builder).await? {
            Ok(_) => Ok(DeleteFileResult::Ok),
            Err(rejection) if rejection.tag() == "not_found" => Ok(DeleteFileResult::NotFound),
            Err(rejection) => Err(rejection.unexpected()),
        }
    }

    async fn share_file(
        &self,
        file_id: FileId,
        principal: Principal,
    ) -> Result<FileSharingResponse, FileVaultError> {
        let builder = self
            .request(reqwest::Method::POST, &format!("/files/{}/shares", file_id))
            .json(&ShareFileRequest {
                principal: &principal,
            });
        match self.send(builder).await? {
            Ok(_) => Ok(FileSharingResponse::Ok),
            Err(rejection) => match rejection.tag() {
                "not_found" => Ok(FileSharingResponse::NotFound),
                "pending_error" => Ok(FileSharingResponse::PendingError),
                "permission_error" => Ok(FileSharingResponse::PermissionError),
                _ => Err(rejection.unexpected()),
            },
        }
    }
}
