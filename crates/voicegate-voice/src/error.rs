use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    /// The operating system random source could not produce bytes.
    #[error("secure random source unavailable: {0}")]
    RandomnessUnavailable(#[from] rand::Error),

    #[error("LiveKit signing key is missing or empty")]
    MissingSigningKey,

    #[error("room name must not be empty")]
    InvalidRoom,

    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
