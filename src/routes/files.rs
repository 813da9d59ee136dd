use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue},
    response::Response,
    Json,
};
use bytes::Bytes;
use data_model::{
    AbortUploadResult,
    DeleteFileResult,
    FileDownloadResponse,
    FileId,
    FileSharingResponse,
    Principal,
    UploadFileAtomicRequest,
    UploadFileContinueRequest,
    DEFAULT_FILE_TYPE,
    NUM_CHUNKS_HEADER,
};
use metrics::AutoIncrement;
use opentelemetry::KeyValue;
use tracing::info;

use super::{caller, RouteState};
use crate::http_objects::{
    ErrorBody,
    FileIdResponse,
    FileMetadata,
    FileVaultAPIError,
    ListFilesResponse,
    RegisterFile,
    ShareFileRequest,
    UploadChunkParams,
    UploadChunkResponse,
    UploadFileParams,
};

/// Upload the first chunk of a file
///
/// Creates the catalog record. A file declared with a single chunk is
/// complete after this call, larger files continue with chunk uploads.
#[utoipa::path(
    post,
    path = "/files",
    params(UploadFileParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    tag = "filevault",
    responses(
        (status = 200, description = "File created", body = FileIdResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn upload_file(
    State(state): State<RouteState>,
    headers: HeaderMap,
    Query(params): Query<UploadFileParams>,
    body: Bytes,
) -> Result<Json<FileIdResponse>, FileVaultAPIError> {
    let size = body.len() as u64;
    let request = UploadFileAtomicRequest {
        file_type: params.file_type(),
        name: params.name,
        content: body,
        num_chunks: params.num_chunks.unwrap_or(1),
        owner: caller(&headers),
    };
    let record = state
        .filevault_state
        .upload_file_atomic(request)
        .await
        .map_err(FileVaultAPIError::internal_error)?;

    let labels = [KeyValue::new("storage_provider", record.storage_provider.to_string())];
    state.metrics.files_created.increment(&labels);
    state.metrics.chunks_accepted.increment(&[]);
    state.metrics.chunk_bytes.add(size, &[]);
    Ok(Json(FileIdResponse {
        file_id: record.file_id.get(),
    }))
}

/// Upload a continuation chunk
#[utoipa::path(
    put,
    path = "/files/{file_id}/chunks/{chunk_index}",
    params(UploadChunkParams),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    tag = "filevault",
    responses(
        (status = 200, description = "Chunk accepted", body = UploadChunkResponse),
        (status = NOT_FOUND, description = "No chunked upload in progress for this file", body = ErrorBody),
        (status = CONFLICT, description = "File already uploaded or chunk rejected", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn upload_chunk(
    State(state): State<RouteState>,
    Path((file_id, chunk_index)): Path<(u64, u64)>,
    Query(params): Query<UploadChunkParams>,
    body: Bytes,
) -> Result<Json<UploadChunkResponse>, FileVaultAPIError> {
    let size = body.len() as u64;
    let request = UploadFileContinueRequest {
        file_id: FileId::new(file_id),
        chunk_index,
        content: body,
        file_type: params
            .file_type
            .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
        num_chunks: params.num_chunks,
    };
    let record = state
        .filevault_state
        .upload_file_continue(request)
        .await
        .map_err(FileVaultAPIError::internal_error)??;

    state.metrics.chunks_accepted.increment(&[]);
    state.metrics.chunk_bytes.add(size, &[]);
    Ok(Json(UploadChunkResponse::from(&record)))
}

/// Register a file in the catalog without uploading chunks
#[utoipa::path(
    post,
    path = "/files/register",
    request_body = RegisterFile,
    tag = "filevault",
    responses(
        (status = 200, description = "File registered", body = FileIdResponse),
        (status = BAD_REQUEST, description = "Blob reference does not match the storage provider", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn register_file(
    State(state): State<RouteState>,
    headers: HeaderMap,
    Json(register): Json<RegisterFile>,
) -> Result<Json<FileIdResponse>, FileVaultAPIError> {
    let request = register.into_request(caller(&headers));
    let record = state
        .filevault_state
        .register_file(request)
        .await
        .map_err(FileVaultAPIError::internal_error)??;

    let labels = [KeyValue::new("storage_provider", record.storage_provider.to_string())];
    state.metrics.files_created.increment(&labels);
    Ok(Json(FileIdResponse {
        file_id: record.file_id.get(),
    }))
}

/// Download one chunk of an uploaded file
///
/// The chunk count of the file is returned in the `x-filevault-num-chunks`
/// header.
#[utoipa::path(
    get,
    path = "/files/{file_id}/chunks/{chunk_index}",
    tag = "filevault",
    responses(
        (status = 200, description = "Chunk contents"),
        (status = FORBIDDEN, description = "Caller may not read this file", body = ErrorBody),
        (status = NOT_FOUND, description = "File or chunk not found", body = ErrorBody),
        (status = CONFLICT, description = "File not fully uploaded", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn download_chunk(
    State(state): State<RouteState>,
    headers: HeaderMap,
    Path((file_id, chunk_index)): Path<(u64, u64)>,
) -> Result<Response<Body>, FileVaultAPIError> {
    let response = state
        .filevault_state
        .reader()
        .download_file(caller(&headers).as_ref(), FileId::new(file_id), chunk_index)
        .map_err(FileVaultAPIError::internal_error)?;
    let data = match response {
        FileDownloadResponse::FoundFile(data) => data,
        rejection => return Err(rejection.into()),
    };

    state.metrics.downloads.increment(&[]);
    let content_type = HeaderValue::from_str(&data.file_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_FILE_TYPE));
    Response::builder()
        .header(CONTENT_TYPE, content_type)
        .header(NUM_CHUNKS_HEADER, data.num_chunks.to_string())
        .body(Body::from(data.contents))
        .map_err(|e| FileVaultAPIError::internal_error(e.into()))
}

/// List the files visible to the caller
#[utoipa::path(
    get,
    path = "/files",
    tag = "filevault",
    responses(
        (status = 200, description = "Files visible to the caller", body = ListFilesResponse),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn list_files(
    State(state): State<RouteState>,
    headers: HeaderMap,
) -> Result<Json<ListFilesResponse>, FileVaultAPIError> {
    let files = state
        .filevault_state
        .reader()
        .list_files(caller(&headers).as_ref())
        .map_err(FileVaultAPIError::internal_error)?
        .into_iter()
        .map(FileMetadata::from)
        .collect();
    Ok(Json(ListFilesResponse { files }))
}

/// Get a single catalog entry
///
/// Entries marked for deletion are still returned so an interrupted
/// deletion can be finished.
#[utoipa::path(
    get,
    path = "/files/{file_id}",
    tag = "filevault",
    responses(
        (status = 200, description = "Catalog entry", body = FileMetadata),
        (status = FORBIDDEN, description = "Caller may not read this file", body = ErrorBody),
        (status = NOT_FOUND, description = "File not found", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn get_file(
    State(state): State<RouteState>,
    headers: HeaderMap,
    Path(file_id): Path<u64>,
) -> Result<Json<FileMetadata>, FileVaultAPIError> {
    let record = state
        .filevault_state
        .reader()
        .get_file(FileId::new(file_id))
        .map_err(FileVaultAPIError::internal_error)?
        .ok_or_else(|| FileVaultAPIError::not_found(&format!("file {} not found", file_id)))?;
    if !record.is_readable_by(caller(&headers).as_ref()) {
        return Err(FileVaultAPIError::permission_error(
            "caller may not read this file",
        ));
    }
    Ok(Json(record.into()))
}

/// Delete a file and its chunks
#[utoipa::path(
    delete,
    path = "/files/{file_id}",
    tag = "filevault",
    responses(
        (status = 200, description = "File deleted"),
        (status = NOT_FOUND, description = "File not found", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn delete_file(
    State(state): State<RouteState>,
    Path(file_id): Path<u64>,
) -> Result<(), FileVaultAPIError> {
    match state
        .filevault_state
        .delete_file(FileId::new(file_id))
        .await
        .map_err(FileVaultAPIError::internal_error)?
    {
        DeleteFileResult::Ok => {
            state.metrics.files_deleted.increment(&[]);
            Ok(())
        }
        DeleteFileResult::NotFound => Err(FileVaultAPIError::not_found(&format!(
            "file {} not found",
            file_id
        ))),
    }
}

/// Record the intent to delete a file
///
/// The file disappears from listings and downloads, its record stays until
/// it is deleted.
#[utoipa::path(
    post,
    path = "/files/{file_id}/deletion",
    tag = "filevault",
    responses(
        (status = 200, description = "File marked for deletion"),
        (status = NOT_FOUND, description = "File not found", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn mark_for_deletion(
    State(state): State<RouteState>,
    Path(file_id): Path<u64>,
) -> Result<(), FileVaultAPIError> {
    match state
        .filevault_state
        .mark_for_deletion(FileId::new(file_id))
        .await
        .map_err(FileVaultAPIError::internal_error)?
    {
        DeleteFileResult::Ok => Ok(()),
        DeleteFileResult::NotFound => Err(FileVaultAPIError::not_found(&format!(
            "file {} not found",
            file_id
        ))),
    }
}

/// Abort an unfinished upload
#[utoipa::path(
    post,
    path = "/files/{file_id}/abort",
    tag = "filevault",
    responses(
        (status = 200, description = "Upload aborted"),
        (status = NOT_FOUND, description = "File not found", body = ErrorBody),
        (status = CONFLICT, description = "File already uploaded", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn abort_upload(
    State(state): State<RouteState>,
    Path(file_id): Path<u64>,
) -> Result<(), FileVaultAPIError> {
    match state
        .filevault_state
        .abort_upload(FileId::new(file_id))
        .await
        .map_err(FileVaultAPIError::internal_error)?
    {
        AbortUploadResult::Ok => {
            info!(file_id, "upload aborted by client");
            Ok(())
        }
        AbortUploadResult::NotFound => Err(FileVaultAPIError::not_found(&format!(
            "file {} not found",
            file_id
        ))),
        AbortUploadResult::AlreadyUploaded => Err(FileVaultAPIError::conflict(
            "already_uploaded",
            "file is already fully uploaded",
        )),
    }
}

/// Grant another principal read access
#[utoipa::path(
    post,
    path = "/files/{file_id}/shares",
    request_body = ShareFileRequest,
    tag = "filevault",
    responses(
        (status = 200, description = "File shared"),
        (status = FORBIDDEN, description = "Only the owner may share a file", body = ErrorBody),
        (status = NOT_FOUND, description = "File not found", body = ErrorBody),
        (status = CONFLICT, description = "File is still pending", body = ErrorBody),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error", body = ErrorBody)
    ),
)]
pub async fn share_file(
    State(state): State<RouteState>,
    headers: HeaderMap,
    Path(file_id): Path<u64>,
    Json(share): Json<ShareFileRequest>,
) -> Result<(), FileVaultAPIError> {
    if share.principal.trim().is_empty() {
        return Err(FileVaultAPIError::bad_request("principal must not be empty"));
    }
    match state
        .filevault_state
        .share_file(
            caller(&headers).as_ref(),
            FileId::new(file_id),
            Principal::new(share.principal),
        )
        .await
        .map_err(FileVaultAPIError::internal_error)?
    {
        FileSharingResponse::Ok => Ok(()),
        FileSharingResponse::NotFound => Err(FileVaultAPIError::not_found(&format!(
            "file {} not found",
            file_id
        ))),
        FileSharingResponse::PendingError => Err(FileVaultAPIError::conflict(
            "pending_error",
            "file is still pending",
        )),
        FileSharingResponse::PermissionError => Err(FileVaultAPIError::permission_error(
            "only the owner may share a file",
        )),
    }
}
