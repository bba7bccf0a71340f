use crate::error::VoiceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity placed in credentials when the caller does not supply one.
pub const DEFAULT_IDENTITY: &str = "my_identity";

/// Default credential lifetime: 15 minutes.
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 900;

/// Upper bound on the credential lifetime (24 hours).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 24 * 60 * 60;

fn default_token_ttl_seconds() -> u64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

fn default_identity() -> String {
    DEFAULT_IDENTITY.to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    /// LiveKit server URL handed to clients alongside their token.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for LiveKit join tokens. Default: 900 (15 minutes).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    /// Identity used when a token request does not name one.
    #[serde(default = "default_identity")]
    pub default_identity: String,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
            default_identity: default_identity(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .field("default_identity", &self.default_identity)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            ..Self::default()
        }
    }

    /// Returns the configured signing key.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::MissingSigningKey`] if the API key or secret is
    /// empty or whitespace.
    pub fn signing_key(&self) -> Result<SigningKey, VoiceError> {
        SigningKey::new(&self.api_key, &self.api_secret)
    }

    /// Returns the credential lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] if the TTL is zero or above
    /// [`MAX_TOKEN_TTL_SECONDS`].
    pub fn token_ttl(&self) -> Result<Duration, VoiceError> {
        if self.token_ttl_seconds == 0 || self.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS {
            return Err(VoiceError::Config(format!(
                "token_ttl_seconds must be between 1 and {MAX_TOKEN_TTL_SECONDS}, got {}",
                self.token_ttl_seconds
            )));
        }
        Ok(Duration::from_secs(self.token_ttl_seconds))
    }

    /// Whether every setting a client needs to reach LiveKit is present.
    pub fn is_complete(&self) -> bool {
        !self.url.trim().is_empty() && self.signing_key().is_ok()
    }
}

/// LiveKit API key and secret pair used to sign access tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    api_key: String,
    api_secret: String,
}

impl SigningKey {
    /// Builds a signing key, rejecting blank keys or secrets.
    pub fn new(api_key: &str, api_secret: &str) -> Result<Self, VoiceError> {
        if api_key.trim().is_empty() || api_secret.trim().is_empty() {
            return Err(VoiceError::MissingSigningKey);
        }
        Ok(Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_redacts_secret() {
        let config = LiveKitConfig::new("ws://localhost:7880", "devkey", "supersecret");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("devkey"));
        assert!(!rendered.contains("supersecret"));

        let key = config.signing_key().unwrap();
        assert!(!format!("{key:?}").contains("supersecret"));
    }

    #[test]
    fn blank_key_or_secret_is_missing() {
        assert!(matches!(
            SigningKey::new("", "secret"),
            Err(VoiceError::MissingSigningKey)
        ));
        assert!(matches!(
            SigningKey::new("devkey", "   "),
            Err(VoiceError::MissingSigningKey)
        ));
        assert!(SigningKey::new("devkey", "secret").is_ok());
    }

    #[test]
    fn ttl_bounds_are_enforced() {
        let mut config = LiveKitConfig::new("", "devkey", "secret");
        assert_eq!(
            config.token_ttl().unwrap(),
            Duration::from_secs(DEFAULT_TOKEN_TTL_SECONDS)
        );

        config.token_ttl_seconds = 0;
        assert!(matches!(config.token_ttl(), Err(VoiceError::Config(_))));

        config.token_ttl_seconds = MAX_TOKEN_TTL_SECONDS + 1;
        assert!(matches!(config.token_ttl(), Err(VoiceError::Config(_))));
    }

    #[test]
    fn secret_is_never_serialized() {
        let config = LiveKitConfig::new("ws://localhost:7880", "devkey", "supersecret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("supersecret"));
    }

    #[test]
    fn incomplete_without_url() {
        assert!(!LiveKitConfig::new("", "devkey", "secret").is_complete());
        assert!(LiveKitConfig::new("ws://localhost:7880", "devkey", "secret").is_complete());
    }
}
