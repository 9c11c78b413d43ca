//! Error types for the voice turn client and relay

use thiserror::Error;

/// Result type alias for voice-turn operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice turn subsystem
///
/// None of these are fatal to a running session. The turn loop logs them and
/// returns to `Idle` so the next turn stays available.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed inbound envelope
    #[error("parse error: {0}")]
    Parse(String),

    /// Audio container could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Transport-level failure
    #[error("channel error: {0}")]
    Channel(String),

    /// Platform refused to start playback
    #[error("playback fault: {0}")]
    Playback(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
