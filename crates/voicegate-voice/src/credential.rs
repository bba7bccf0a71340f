use crate::config::{LiveKitConfig, SigningKey};
use crate::error::VoiceError;
use chrono::{DateTime, Utc};
use livekit_api::access_token::{AccessToken, VideoGrants};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Room-scoped authorization embedded in an access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomGrant {
    #[serde(rename = "roomJoin")]
    pub room_join: bool,
    pub room: String,
}

/// A signed LiveKit access token together with the claims it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCredential {
    /// Participant identity (`sub` claim).
    pub identity: String,
    /// Participant display name (`name` claim).
    pub name: String,
    /// Room the grant is scoped to.
    #[serde(rename = "roomName")]
    pub room_name: String,
    /// The signed JWT.
    #[serde(rename = "accessToken")]
    pub token: String,
    pub grant: RoomGrant,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
}

/// Mints a LiveKit access token granting `identity` the right to join `room`.
///
/// A missing or blank identity falls back to [`crate::DEFAULT_IDENTITY`].
///
/// # Errors
///
/// - [`VoiceError::InvalidRoom`] if `room` is blank.
/// - [`VoiceError::LiveKit`] if token encoding fails.
pub fn issue(
    identity: Option<&str>,
    room: &str,
    key: &SigningKey,
    ttl: Duration,
) -> Result<AccessCredential, VoiceError> {
    issue_with_default(identity, crate::DEFAULT_IDENTITY, room, key, ttl)
}

fn issue_with_default(
    identity: Option<&str>,
    default_identity: &str,
    room: &str,
    key: &SigningKey,
    ttl: Duration,
) -> Result<AccessCredential, VoiceError> {
    if room.trim().is_empty() {
        return Err(VoiceError::InvalidRoom);
    }

    let identity = identity
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_identity);

    let grant = RoomGrant {
        room_join: true,
        room: room.to_string(),
    };

    let issued_at = Utc::now();
    let token = AccessToken::with_api_key(key.api_key(), key.api_secret())
        .with_identity(identity)
        .with_name(identity)
        .with_grants(VideoGrants {
            room_join: grant.room_join,
            room: grant.room.clone(),
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
            ..Default::default()
        })
        .with_ttl(ttl)
        .to_jwt()?;

    let expires_at = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    Ok(AccessCredential {
        identity: identity.to_string(),
        name: identity.to_string(),
        room_name: grant.room.clone(),
        token,
        grant,
        expires_at,
    })
}

/// Issues credentials with a fixed signing key and lifetime.
///
/// Construction fails if the configuration has no usable key, so a service
/// holding a `CredentialIssuer` can never emit unsigned tokens.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    key: SigningKey,
    ttl: Duration,
    default_identity: String,
}

impl CredentialIssuer {
    pub fn new(config: &LiveKitConfig) -> Result<Self, VoiceError> {
        let key = config.signing_key()?;
        let ttl = config.token_ttl()?;
        let default_identity = if config.default_identity.trim().is_empty() {
            crate::DEFAULT_IDENTITY.to_string()
        } else {
            config.default_identity.trim().to_string()
        };
        Ok(Self {
            key,
            ttl,
            default_identity,
        })
    }

    /// Issues a credential for `room` using this issuer's key and lifetime.
    pub fn issue(&self, identity: Option<&str>, room: &str) -> Result<AccessCredential, VoiceError> {
        let credential =
            issue_with_default(identity, &self.default_identity, room, &self.key, self.ttl)?;
        tracing::debug!(
            room = %credential.room_name,
            identity = %credential.identity,
            expires_at = %credential.expires_at,
            "issued access credential"
        );
        Ok(credential)
    }
}
