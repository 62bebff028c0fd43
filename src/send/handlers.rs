//! HTTP handlers for the listing page and file downloads.

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Response},
    response::IntoResponse,
};
use tokio_util::io::ReaderStream;

use crate::common::AppError;
use crate::server::ServeState;
use crate::ui::web;

/// Listing of the current snapshot plus the upload form.
pub async fn index_handler(State(state): State<ServeState>) -> impl IntoResponse {
    web::serve_index(&state.shares())
}

/// Stream one shared file as an attachment.
///
/// The index is checked against the snapshot current at request time; a
/// non-numeric or stale index is a 404, same as a file gone from disk.
pub async fn download_handler(
    Path(index): Path<String>,
    State(state): State<ServeState>,
) -> Result<Response<Body>, AppError> {
    let shares = state.shares();
    let entry = index
        .parse::<usize>()
        .ok()
        .and_then(|i| shares.get(i))
        .ok_or_else(|| AppError::NotFound(format!("No shared file at index {index}")))?;

    let file = match tokio::fs::File::open(&entry.source_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("File not found: {}", entry.name)));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("open {}", entry.source_path.display()))
                .into());
        }
    };
    let metadata = file.metadata().await.context("stat shared file")?;
    if !metadata.is_file() {
        return Err(AppError::NotFound(format!("File not found: {}", entry.name)));
    }

    tracing::info!(name = %entry.name, size = metadata.len(), "serving download");

    Ok(Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::CONTENT_DISPOSITION, content_disposition(&entry.name))
        .body(Body::from_stream(ReaderStream::new(file)))
        .context("build response")?)
}

/// `attachment; filename="..."` restricted to characters legal in a header value.
fn content_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
