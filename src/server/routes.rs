//! Router definition for the share/upload surface.

use crate::{receive, send, server::ServeState, ui::web};
use axum::{extract::DefaultBodyLimit, routing::*, Router};

/// Build the router. Upload bodies are capped at `max_upload_bytes`.
pub fn create_router(state: &ServeState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(send::handlers::index_handler))
        .route("/download/:index", get(send::handlers::download_handler))
        .route("/upload", post(receive::handlers::upload_handler))
        .route("/favicon.svg", get(|| async { web::serve_favicon() }))
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
