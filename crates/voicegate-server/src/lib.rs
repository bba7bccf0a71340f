//! voicegate token service library logic.

pub mod api;
pub mod api_auth;
pub mod api_upload;
pub mod config;
pub mod session;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use config::{Config, ConfigError, CorsPolicy, UploadsConfig};
use session::PageGate;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use voicegate_voice::{CredentialIssuer, OsRoomNamer, RoomNamer};

/// Application state shared across all request handlers.
///
/// Built once at startup. Only the page session table changes afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Mints credentials with the deployment's signing key.
    pub issuer: Arc<CredentialIssuer>,
    /// Source of fresh room names.
    pub room_namer: Arc<dyn RoomNamer>,
    /// Resolved cross-origin policy.
    pub cors: CorsPolicy,
    /// Page password gate and its sessions.
    pub pages: Arc<PageGate>,
    /// Where resumes are stored and how large they may be.
    pub uploads: UploadsConfig,
}

impl AppState {
    /// Builds the state from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the signing key, token TTL or CORS origins
    /// are unusable. The service must not start in that case.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            issuer: Arc::new(CredentialIssuer::new(&config.livekit)?),
            room_namer: Arc::new(OsRoomNamer),
            cors: config.cors.policy()?,
            pages: Arc::new(PageGate::new(&config.auth)),
            uploads: config.uploads.clone(),
        })
    }
}

/// Body limit for every route except resume uploads.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024;

/// Builds the CORS layer for the given policy.
fn cors_layer(policy: &CorsPolicy) -> CorsLayer {
    let origin = match policy {
        CorsPolicy::Any => AllowOrigin::any(),
        CorsPolicy::AllowList(origins) => AllowOrigin::list(origins.iter().cloned()),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.cors);
    let upload_limit = DefaultBodyLimit::max(state.uploads.max_bytes);

    Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health))
        .route("/getToken", get(api::get_token_handler))
        .route("/check-auth", get(api_auth::check_auth_handler))
        .route("/verify-password", post(api_auth::verify_password_handler))
        .route(
            "/api/process-resume",
            post(api_upload::process_resume_handler).layer(upload_limit),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
