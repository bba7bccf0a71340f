//! Room name generation.
//!
//! Every credential request gets a fresh room. Names are `room-` followed by
//! 12 lowercase hex characters (48 random bits), which keeps collisions
//! negligible for the number of sessions a deployment sees.

use crate::error::VoiceError;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every generated room name.
pub const ROOM_PREFIX: &str = "room-";

/// Number of random bytes in the suffix (two hex characters each).
const SUFFIX_BYTES: usize = 6;

/// A generated LiveKit room name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Validates a room name produced by [`RoomNamer`].
    ///
    /// Returns `None` unless the value is `room-` followed by exactly 12
    /// lowercase hex characters.
    pub fn parse(value: &str) -> Option<Self> {
        let suffix = value.strip_prefix(ROOM_PREFIX)?;
        let well_formed = suffix.len() == SUFFIX_BYTES * 2
            && suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        well_formed.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Source of fresh room names.
pub trait RoomNamer: Send + Sync {
    /// Generates a new room name.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::RandomnessUnavailable`] if the random source
    /// fails. The failure is not retried.
    fn new_room_name(&self) -> Result<RoomName, VoiceError>;
}

/// Room namer backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRoomNamer;

impl RoomNamer for OsRoomNamer {
    fn new_room_name(&self) -> Result<RoomName, VoiceError> {
        room_name_from_rng(&mut OsRng)
    }
}

/// Builds a room name from the given random source.
pub fn room_name_from_rng<R: RngCore + ?Sized>(rng: &mut R) -> Result<RoomName, VoiceError> {
    let mut suffix = [0u8; SUFFIX_BYTES];
    rng.try_fill_bytes(&mut suffix)?;
    Ok(RoomName(format!("{ROOM_PREFIX}{}", hex::encode(suffix))))
}
