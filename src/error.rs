//! Error types for the avatar animation core.
//!
//! Only construction-time and utterance-start failures are errors. Anything
//! that can go wrong inside a frame tick is modelled as an absent value.

/// Top-level error type for the facial animation core.
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Invalid configuration (smoothing constant, cap, interval range, ...).
    #[error("config error: {0}")]
    Config(String),

    /// Audio playback could not be started or failed mid-stream.
    #[error("playback error: {0}")]
    Playback(String),

    /// A required asset could not be read or decoded.
    #[error("asset error: {0}")]
    Asset(String),

    /// A viseme supplier produced a malformed timeline.
    #[error("timeline error: {0}")]
    Timeline(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AvatarError>;
