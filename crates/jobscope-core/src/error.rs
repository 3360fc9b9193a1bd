//! Error types for jobscope.

use thiserror::Error;

/// Result type alias using jobscope's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for jobscope operations.
///
/// Every outward-facing adapter operation returns one of these kinds; the
/// HTTP layer maps them onto status codes. Transport failures never trigger
/// an automatic reconnect — the caller re-runs `connect`.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input: bad endpoint string, unknown job status, limit or
    /// offset out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation invoked before `connect` or after `disconnect`.
    #[error("Not connected to broker")]
    NotConnected,

    /// Job could not be located, or its record vanished after a positive
    /// index probe.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Structural field of a job record failed to parse.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A single-subscriber adapter already has an active subscription.
    #[error("Already subscribed")]
    AlreadySubscribed,

    /// Caller-supplied deadline fired before the operation completed.
    #[error("Cancelled")]
    Cancelled,

    /// Underlying broker I/O error (connection, auth, protocol).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected failure; includes cause.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
