//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire frames and events.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match the expected shape.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame names a channel this client does not know.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// A known channel arrived in the wrong direction.
    #[error("channel {channel} is not valid for {direction} frames")]
    WrongDirection {
        /// Channel name as received.
        channel: String,
        /// "client" or "server".
        direction: &'static str,
    },
}
