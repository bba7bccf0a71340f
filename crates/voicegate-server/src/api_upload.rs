//! Resume upload handler.
//!
//! Stores one document per session under the configured upload directory as
//! `<session_id>_resume<ext>`, replacing any earlier upload for that session.

use crate::{api::ApiError, AppState};
use axum::{
    extract::{Extension, Multipart},
    Json,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

/// Document types accepted as a resume.
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx"];

/// Longest session id accepted as part of a file name.
const MAX_SESSION_ID_CHARS: usize = 128;

/// Lowercased extension of `file_name` if it is an accepted document type.
fn allowed_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?;
    let ext = format!(".{}", ext.to_ascii_lowercase());
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Session ids become part of a path, so only `[A-Za-z0-9_-]` is allowed.
fn valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_CHARS
        && session_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Handler for `POST /api/process-resume`.
///
/// Expects a multipart form with a `resume` file and a `session_id` field.
pub async fn process_resume_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut resume = None;
    let mut session_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {e}")))?
    {
        match field.name() {
            Some("resume") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
                resume = Some((file_name, data));
            }
            Some("session_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
                session_id = Some(value);
            }
            _ => {}
        }
    }

    let (file_name, data) = resume
        .ok_or_else(|| ApiError::BadRequest("No resume file part in the request".to_string()))?;
    let session_id = session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No session_id provided".to_string()))?;
    if file_name.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }
    let ext = allowed_extension(&file_name).ok_or_else(|| {
        ApiError::BadRequest("Invalid file type. Allowed: .pdf, .doc, .docx".to_string())
    })?;
    if !valid_session_id(&session_id) {
        return Err(ApiError::BadRequest("Invalid session_id".to_string()));
    }

    let dir = &state.uploads.dir;
    let path = dir.join(format!("{session_id}_resume{ext}"));
    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &data).await
    }
    .await;
    if let Err(e) = written {
        tracing::error!(path = %path.display(), error = %e, "failed to save resume");
        return Err(ApiError::InternalServerError(
            "Failed to save resume file on server".to_string(),
        ));
    }

    tracing::info!(
        session_id = %session_id,
        path = %path.display(),
        bytes = data.len(),
        "saved resume"
    );

    Ok(Json(json!({
        "message": "Resume received and saved successfully"
    })))
}
