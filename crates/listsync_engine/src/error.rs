//! Error types for the sync engine.

use listsync_log::LogError;
use listsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The event log could not persist or read a record.
    #[error("storage error: {0}")]
    Storage(#[from] LogError),

    /// An inbound payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] ProtocolError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The log and the engine's view of it disagree.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The command cannot be issued locally.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The engine task is no longer running.
    #[error("sync engine stopped")]
    EngineStopped,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            _ => false,
        }
    }
}
