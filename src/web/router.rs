//! Router configuration for the REST adapter.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers::{download_file, file_details, find_files, list_files, upload_file, AppState};

/// Allowance for multipart framing and text fields on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the file API router, mounted under `/f`.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(app_state.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let file_routes = Router::new()
        .route("/ul", post(upload_file))
        .route("/dl/:title", get(download_file))
        .route("/ls", get(list_files))
        .route("/dt", get(file_details))
        .route("/fd", post(find_files));

    Router::new()
        .nest("/f", file_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}
