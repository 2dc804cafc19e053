//! API routes for the screening server

pub mod jobs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Headroom for multipart boundaries and part headers on top of the file limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Upload, with a body limit just above the file limit; the dispatcher
        // enforces the exact byte count
        .route(
            "/analyze",
            post(jobs::analyze)
                .layer(DefaultBodyLimit::max(max_upload_size.saturating_add(MULTIPART_OVERHEAD))),
        )
        .route("/status/:id", get(jobs::get_status))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_status).delete(jobs::delete_job))
        .route("/stats", get(jobs::stats))
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "media-screen",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Transcribe uploaded audio and flag disallowed terms with word timings",
        "endpoints": {
            "POST /api/analyze": "Upload a media file (multipart field 'file') for screening",
            "GET /api/status/:id": "Get job status, progress and result",
            "GET /api/jobs": "List tracked jobs",
            "DELETE /api/jobs/:id": "Delete a job record",
            "GET /api/stats": "Job counts and average processing time"
        }
    }))
}
