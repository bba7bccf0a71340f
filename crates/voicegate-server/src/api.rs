//! API handlers for the token service.

use crate::AppState;
use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use voicegate_voice::{AccessCredential, VoiceError};

/// Longest display name accepted from a client.
pub const MAX_NAME_CHARS: usize = 128;

/// Query parameters for `GET /getToken`.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    /// Optional participant name; the configured default is used when absent.
    pub name: Option<String>,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<VoiceError> for ApiError {
    fn from(err: VoiceError) -> Self {
        // Details stay in the log; clients only learn that issuance failed.
        tracing::error!(error = %err, "failed to issue access credential");
        ApiError::InternalServerError("failed to issue access credential".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `GET /getToken`.
///
/// Generates a fresh room and returns a credential scoped to it.
pub async fn get_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<AccessCredential>, ApiError> {
    let name = query.name.as_deref().map(str::trim);
    if let Some(name) = name {
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(ApiError::BadRequest(format!(
                "name must be at most {MAX_NAME_CHARS} characters"
            )));
        }
    }

    let room = state.room_namer.new_room_name()?;
    let credential = state.issuer.issue(name, room.as_str())?;

    tracing::info!(
        room = %credential.room_name,
        identity = %credential.identity,
        "issued room token"
    );

    Ok(Json(credential))
}

/// Handler for `GET /health`.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "voicegate-token",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handler for `GET /`.
pub async fn index() -> &'static str {
    "voicegate token service is running"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn voice_errors_map_to_server_error() {
        for err in [VoiceError::InvalidRoom, VoiceError::MissingSigningKey] {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(json["error"], "failed to issue access credential");
        }
    }

    #[tokio::test]
    async fn bad_request_keeps_message() {
        let response = ApiError::BadRequest("name too long".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "name too long");
    }
}
