//! Voice session credentials for voicegate.
//!
//! Clients join LiveKit rooms with short-lived access tokens. This crate
//! generates the room names those tokens are scoped to and mints the tokens
//! themselves, signed with the deployment's LiveKit API secret.
//!
//! Issuance is stateless: nothing is recorded about issued credentials and
//! there is no revocation. The LiveKit server is the only party that verifies
//! them.

pub mod config;
pub mod credential;
pub mod error;
pub mod room;

pub use config::{LiveKitConfig, SigningKey, DEFAULT_IDENTITY, DEFAULT_TOKEN_TTL_SECONDS};
pub use credential::{issue, AccessCredential, CredentialIssuer, RoomGrant};
pub use error::VoiceError;
pub use room::{room_name_from_rng, OsRoomNamer, RoomName, RoomNamer};
