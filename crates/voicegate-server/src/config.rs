//! Token service configuration loading from file and environment variables.

use axum::http::HeaderValue;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;
use voicegate_voice::{LiveKitConfig, VoiceError};

/// Top-level token service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LiveKit credentials and token policy.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Cross-origin settings.
    #[serde(default)]
    pub cors: CorsConfig,

    /// Page password gate.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Resume upload settings.
    #[serde(default)]
    pub uploads: UploadsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Browser origins allowed to call the token service.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Either `["*"]` or a list of exact origins such as `https://app.example.com`.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Page password gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Passwords that open a page session. Empty means no password is accepted.
    #[serde(default)]
    pub page_passwords: Vec<String>,

    /// Deployment environment; `development` skips the password gate.
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Idle lifetime of a page session.
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
}

/// Resume upload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadsConfig {
    /// Directory uploaded resumes are written to.
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,

    /// Largest accepted upload request body, in bytes.
    #[serde(default = "default_upload_max_bytes")]
    pub max_bytes: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "voicegate_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    5001
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_app_env() -> String {
    "production".to_string()
}

fn default_session_ttl_seconds() -> u64 {
    30 * 60
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_upload_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            page_passwords: Vec::new(),
            app_env: default_app_env(),
            session_ttl_seconds: default_session_ttl_seconds(),
        }
    }
}

impl AuthConfig {
    pub fn is_development(&self) -> bool {
        self.app_env.trim().eq_ignore_ascii_case("development")
    }

    /// Configured passwords with surrounding whitespace and blanks removed.
    pub fn passwords(&self) -> Vec<String> {
        self.page_passwords
            .iter()
            .map(|password| password.trim())
            .filter(|password| !password.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_bytes: default_upload_max_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Resolved cross-origin policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// Any origin may call the service.
    Any,
    /// Only the listed origins; the matching origin is echoed back.
    AllowList(Vec<HeaderValue>),
}

impl CorsConfig {
    /// Parses the configured origins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOrigin`] for an empty list, a `*` mixed
    /// with explicit origins, or an origin that is not an `http(s)://host[:port]`
    /// header value.
    pub fn policy(&self) -> Result<CorsPolicy, ConfigError> {
        let origins: Vec<&str> = self
            .allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .collect();

        if origins.is_empty() {
            return Err(ConfigError::InvalidOrigin(
                "allowed_origins must not be empty; use \"*\" to allow any origin".to_string(),
            ));
        }

        if origins.contains(&"*") {
            if origins.len() > 1 {
                return Err(ConfigError::InvalidOrigin(
                    "\"*\" cannot be combined with explicit origins".to_string(),
                ));
            }
            return Ok(CorsPolicy::Any);
        }

        let mut parsed = Vec::with_capacity(origins.len());
        for origin in origins {
            let has_scheme = origin.starts_with("http://") || origin.starts_with("https://");
            let host = origin.split_once("://").map_or("", |(_, rest)| rest);
            if !has_scheme || host.is_empty() || host.contains('/') {
                return Err(ConfigError::InvalidOrigin(origin.to_string()));
            }
            let value = HeaderValue::from_str(origin)
                .map_err(|_| ConfigError::InvalidOrigin(origin.to_string()))?;
            parsed.push(value);
        }
        Ok(CorsPolicy::AllowList(parsed))
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The LiveKit settings cannot produce valid credentials.
    #[error("invalid livekit settings: {0}")]
    LiveKit(#[from] VoiceError),

    /// A configured CORS origin is malformed.
    #[error("invalid cors origin: {0}")]
    InvalidOrigin(String),

    /// A setting is out of range.
    #[error("invalid setting {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: &'static str,
    },

    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

impl Config {
    /// Checks every setting the service needs before accepting traffic.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the signing key is missing, the token TTL is
    /// out of range, the CORS origins are malformed, or the session or
    /// upload limits are zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.livekit.signing_key()?;
        self.livekit.token_ttl()?;
        self.cors.policy()?;
        if self.auth.session_ttl_seconds == 0 {
            return Err(ConfigError::InvalidSetting {
                setting: "auth.session_ttl_seconds",
                reason: "must be positive",
            });
        }
        if self.uploads.max_bytes == 0 {
            return Err(ConfigError::InvalidSetting {
                setting: "uploads.max_bytes",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOICEGATE_HOST` overrides `server.host`
/// - `VOICEGATE_PORT` overrides `server.port`
/// - `LIVEKIT_URL` overrides `livekit.url`
/// - `LIVEKIT_API_KEY` overrides `livekit.api_key`
/// - `LIVEKIT_API_SECRET` overrides `livekit.api_secret`
/// - `VOICEGATE_TOKEN_TTL_SECONDS` overrides `livekit.token_ttl_seconds`
/// - `VOICEGATE_CORS_ORIGINS` overrides `cors.allowed_origins` (comma separated)
/// - `PAGE_PASSWORDS` overrides `auth.page_passwords` (comma separated)
/// - `APP_ENV` overrides `auth.app_env`
/// - `VOICEGATE_SESSION_TTL_SECONDS` overrides `auth.session_ttl_seconds`
/// - `VOICEGATE_UPLOAD_DIR` overrides `uploads.dir`
/// - `VOICEGATE_UPLOAD_MAX_BYTES` overrides `uploads.max_bytes`
/// - `VOICEGATE_LOG_LEVEL` overrides `logging.level`
/// - `VOICEGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if an override does not parse.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Like [`load_config`], reading environment variables through `lookup`.
///
/// # Errors
///
/// See [`load_config`].
pub fn load_config_with_env<F>(path: Option<&str>, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(config, lookup)
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

/// Applies environment overrides using `lookup` to read variables.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEnv`] when a numeric or address override
/// does not parse.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("VOICEGATE_HOST") {
        config.server.host = parse_env("VOICEGATE_HOST", host)?;
    }
    if let Some(port) = lookup("VOICEGATE_PORT") {
        config.server.port = parse_env("VOICEGATE_PORT", port)?;
    }
    if let Some(url) = lookup("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(api_key) = lookup("LIVEKIT_API_KEY") {
        config.livekit.api_key = api_key;
    }
    if let Some(api_secret) = lookup("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = api_secret;
    }
    if let Some(ttl) = lookup("VOICEGATE_TOKEN_TTL_SECONDS") {
        config.livekit.token_ttl_seconds = parse_env("VOICEGATE_TOKEN_TTL_SECONDS", ttl)?;
    }
    if let Some(origins) = lookup("VOICEGATE_CORS_ORIGINS") {
        config.cors.allowed_origins = origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
    }
    if let Some(passwords) = lookup("PAGE_PASSWORDS") {
        config.auth.page_passwords = passwords.split(',').map(str::to_string).collect();
    }
    if let Some(app_env) = lookup("APP_ENV") {
        config.auth.app_env = app_env;
    }
    if let Some(ttl) = lookup("VOICEGATE_SESSION_TTL_SECONDS") {
        config.auth.session_ttl_seconds = parse_env("VOICEGATE_SESSION_TTL_SECONDS", ttl)?;
    }
    if let Some(dir) = lookup("VOICEGATE_UPLOAD_DIR") {
        config.uploads.dir = PathBuf::from(dir);
    }
    if let Some(max) = lookup("VOICEGATE_UPLOAD_MAX_BYTES") {
        config.uploads.max_bytes = parse_env("VOICEGATE_UPLOAD_MAX_BYTES", max)?;
    }
    if let Some(level) = lookup("VOICEGATE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("VOICEGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}
