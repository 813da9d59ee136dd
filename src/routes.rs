use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{HeaderMap, Method},
    routing::{get, post, put},
    Json,
    Router,
};
use blob_store::ContentStore;
use data_model::{Principal, PRINCIPAL_HEADER};
use metrics::api_io_stats;
use state_store::FileVaultState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::http_objects::{
    ErrorBody,
    FileIdResponse,
    FileMetadata,
    ListFilesResponse,
    RegisterFile,
    ShareFileRequest,
    UploadChunkResponse,
};

mod blobs;
mod files;

#[derive(OpenApi)]
#[openapi(
        paths(
            files::upload_file,
            files::upload_chunk,
            files::register_file,
            files::download_chunk,
            files::list_files,
            files::get_file,
            files::delete_file,
            files::mark_for_deletion,
            files::abort_upload,
            files::share_file,
        ),
        components(
            schemas(
                ErrorBody,
                FileIdResponse,
                FileMetadata,
                ListFilesResponse,
                RegisterFile,
                ShareFileRequest,
                UploadChunkResponse,
            )
        ),
        tags(
            (name = "filevault", description = "FileVault API")
        )
    )]
pub struct ApiDoc;

#[derive(Clone)]
pub struct RouteState {
    pub filevault_state: Arc<FileVaultState>,
    pub content_store: Arc<dyn ContentStore>,
    pub metrics: Arc<api_io_stats::Metrics>,
    pub max_chunk_bytes: usize,
    pub max_blob_bytes: usize,
}

/// Principal named by the request headers. Requests without one act
/// anonymously and only see unowned files.
pub fn caller(headers: &HeaderMap) -> Option<Principal> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(Principal::from)
}

pub fn create_routes(route_state: RouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any);

    let file_routes = Router::new()
        .route(
            "/files",
            get(files::list_files).post(files::upload_file),
        )
        .route("/files/register", post(files::register_file))
        .route(
            "/files/{file_id}",
            get(files::get_file).delete(files::delete_file),
        )
        .route(
            "/files/{file_id}/chunks/{chunk_index}",
            get(files::download_chunk).put(files::upload_chunk),
        )
        .route("/files/{file_id}/abort", post(files::abort_upload))
        .route("/files/{file_id}/deletion", post(files::mark_for_deletion))
        .route("/files/{file_id}/shares", post(files::share_file))
        .layer(DefaultBodyLimit::max(route_state.max_chunk_bytes));

    let blob_routes = Router::new()
        .route("/v1/blobs", put(blobs::put_blob))
        .route(
            "/v1/blobs/{blob_id}",
            get(blobs::get_blob).delete(blobs::delete_blob),
        )
        .layer(DefaultBodyLimit::max(route_state.max_blob_bytes));

    Router::new()
        .route("/", get(index))
        .route("/docs/openapi.json", get(openapi))
        .merge(file_routes)
        .merge(blob_routes)
        .with_state(route_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
}

async fn index() -> &'static str {
    "FileVault Server"
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
