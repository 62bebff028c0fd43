//! HTTP handler for inbound uploads.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::extract::multipart::{Field, MultipartError, MultipartRejection};
use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::common::events::sender_label;
use crate::common::{AppError, ControlEvent, UploadReceipt};
use crate::receive::storage::{StagingArea, TempArtifact};
use crate::server::ServeState;
use crate::utils::security;

pub const NO_FILE_PART: &str = "No file part in the request";
pub const NO_SELECTED_FILE: &str = "No selected file";
const UPLOAD_FIELD: &str = "file";

/// Stage an uploaded file and hand it to the controller for confirmation.
///
/// Never waits for the operator: the response is sent as soon as the
/// payload is on disk and the event is queued.
pub async fn upload_handler(
    State(state): State<ServeState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !state.ready.is_open() {
        return Err(AppError::ServiceUnavailable(
            "Server is not ready to accept uploads".to_string(),
        ));
    }

    let mut multipart = multipart.map_err(|e| {
        tracing::debug!(error = %e, "upload without multipart body");
        AppError::BadRequest(NO_FILE_PART.to_string())
    })?;

    let mut staged = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&e))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let client_name = field.file_name().unwrap_or_default().to_string();
        if client_name.is_empty() {
            return Err(AppError::BadRequest(NO_SELECTED_FILE.to_string()));
        }
        let filename = security::secure_filename(&client_name);

        let (size_bytes, artifact) = stage_upload(&state.staging, &filename, &mut field)
            .await
            .map_err(staging_error)?;
        staged = Some((filename, size_bytes, artifact));
        break;
    }
    let (filename, size_bytes, artifact) =
        staged.ok_or_else(|| AppError::BadRequest(NO_FILE_PART.to_string()))?;

    let sender = sender_label(connect_info.map(|ConnectInfo(addr)| addr));
    tracing::debug!(%filename, size_bytes, %sender, "upload staged");

    let receipt = UploadReceipt {
        original_filename: filename.clone(),
        temp_path: artifact.path().to_path_buf(),
        size_bytes,
        sender,
    };
    if !state.events.send(ControlEvent::UploadReceived(receipt)) {
        // Dropping the artifact removes the staged file
        return Err(AppError::ServiceUnavailable(
            "Server is shutting down".to_string(),
        ));
    }
    // The controller owns the file from here on
    let _ = artifact.into_path();

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": format!("File '{filename}' received and is awaiting confirmation."),
        })),
    ))
}

// Body-limit hits map to 413, anything else to 400
fn multipart_error(err: &MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("Upload too large: {}", err.body_text()))
    } else {
        AppError::BadRequest(format!("Malformed multipart body: {}", err.body_text()))
    }
}

fn staging_error(err: anyhow::Error) -> AppError {
    match err.downcast_ref::<MultipartError>() {
        Some(multipart) => multipart_error(multipart),
        None => AppError::Internal(err.context("Error saving file")),
    }
}

/// Stream one multipart field into a fresh staging artifact.
/// On error the artifact is dropped, which deletes the partial file.
async fn stage_upload(
    staging: &StagingArea,
    filename: &str,
    field: &mut Field<'_>,
) -> Result<(u64, TempArtifact)> {
    let area = staging.clone();
    let name = filename.to_string();
    let (file, artifact) = tokio::task::spawn_blocking(move || area.allocate(&name))
        .await
        .context("staging task failed")?
        .context("allocate staging file")?;
    let mut file = tokio::fs::File::from_std(file);

    while let Some(chunk) = field.chunk().await.context("read upload body")? {
        file.write_all(&chunk)
            .await
            .context("write staging file")?;
    }
    file.flush().await.context("flush staging file")?;
    drop(file);

    let size_bytes = tokio::fs::metadata(artifact.path())
        .await
        .context("stat staging file")?
        .len();
    Ok((size_bytes, artifact))
}
