//! Development content store. Speaks the publisher and aggregator blob
//! routes so the client can run against a single local server.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header::CONTENT_TYPE,
    response::Response,
    Json,
};
use blob_store::PutBlobResponse;
use bytes::Bytes;
use data_model::{BlobId, DEFAULT_FILE_TYPE};
use tracing::debug;

use super::RouteState;
use crate::http_objects::{FileVaultAPIError, PutBlobParams};

pub async fn put_blob(
    State(state): State<RouteState>,
    Query(params): Query<PutBlobParams>,
    body: Bytes,
) -> Result<Json<PutBlobResponse>, FileVaultAPIError> {
    let size = body.len();
    let blob_id = state
        .content_store
        .put(body)
        .await
        .map_err(FileVaultAPIError::internal_error)?;
    debug!(%blob_id, size, epochs = ?params.epochs, "stored blob");
    Ok(Json(PutBlobResponse::plain(&blob_id)))
}

pub async fn get_blob(
    State(state): State<RouteState>,
    Path(blob_id): Path<String>,
) -> Result<Response<Body>, FileVaultAPIError> {
    let blob_id = BlobId::new(blob_id);
    let contents = state
        .content_store
        .get(&blob_id)
        .await
        .map_err(FileVaultAPIError::internal_error)?
        .ok_or_else(|| FileVaultAPIError::not_found(&format!("blob {} not found", blob_id)))?;
    Response::builder()
        .header(CONTENT_TYPE, DEFAULT_FILE_TYPE)
        .body(Body::from(contents))
        .map_err(|e| FileVaultAPIError::internal_error(e.into()))
}

pub async fn delete_blob(
    State(state): State<RouteState>,
    Path(blob_id): Path<String>,
) -> Result<(), FileVaultAPIError> {
    let blob_id = BlobId::new(blob_id);
    if state
        .content_store
        .delete(&blob_id)
        .await
        .map_err(FileVaultAPIError::internal_error)?
    {
        Ok(())
    } else {
        Err(FileVaultAPIError::not_found(&format!(
            "blob {} not found",
            blob_id
        )))
    }
}
