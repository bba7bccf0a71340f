//! Page password gate handlers.

use crate::{api::ApiError, AppState};
use axum::{
    body::Bytes,
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Body of `POST /verify-password`.
#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    pub password: Option<String>,
}

/// Handler for `GET /check-auth`.
pub async fn check_auth_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if state.pages.is_bypassed() || state.pages.is_authenticated(&headers) {
        return Json(json!({ "authenticated": true })).into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "authenticated": false })),
    )
        .into_response()
}

/// Handler for `POST /verify-password`.
///
/// The body is parsed leniently: a missing or non-JSON body is reported as a
/// missing password rather than an extractor rejection.
pub async fn verify_password_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if state.pages.is_bypassed() {
        let body = json!({ "message": "Authentication successful (dev mode)" });
        return Ok(Json(body).into_response());
    }

    let password = serde_json::from_slice::<PasswordRequest>(&body)
        .ok()
        .and_then(|request| request.password)
        .filter(|password| !password.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Password required".to_string()))?;

    if !state.pages.accepts(&password) {
        tracing::warn!("page password rejected");
        return Err(ApiError::Unauthorized("Invalid password".to_string()));
    }

    let session = state.pages.sessions.create().map_err(|e| {
        tracing::error!(error = %e, "failed to open page session");
        ApiError::InternalServerError("failed to open session".to_string())
    })?;
    tracing::info!("page session opened");

    Ok((
        [(header::SET_COOKIE, state.pages.cookie(&session))],
        Json(json!({ "message": "Authentication successful" })),
    )
        .into_response())
}
