//! HTTP surface over [`MetadataService`].
//!
//! ## Routes
//! - `GET  /healthz`: liveness plus the live session count
//! - `POST /analyze`: multipart upload (field `file`), returns the session
//!   id, the AI analysis and the generated fields
//! - `GET  /sessions/{id}`: session state and fields
//! - `POST /sessions/{id}/edits`: `{"edits": {"XMP.Title": "..."}}`
//! - `POST /sessions/{id}/reset`: back to the generated fields
//! - `POST /sessions/{id}/finalize`: optional last edits, returns the image
//! - `GET  /sessions/{id}/download`: the finalized image again

mod error;
mod handlers;

pub use error::AppError;
pub use handlers::EditRequest;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Method,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::pipeline::MetadataService;

/// Shared handler state.
pub type AppState = Arc<MetadataService>;

/// Build the router with CORS and the upload size limit applied.
pub fn router(service: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    routes()
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(service)
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/analyze", post(handlers::analyze))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/sessions/{id}/edits", post(handlers::edit_session))
        .route("/sessions/{id}/reset", post(handlers::reset_session))
        .route("/sessions/{id}/finalize", post(handlers::finalize_session))
        .route("/sessions/{id}/download", get(handlers::download))
}
