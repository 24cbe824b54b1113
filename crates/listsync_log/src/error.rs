//! Error types for the event log.

use crate::record::Timestamp;
use listsync_storage::StorageError;
use thiserror::Error;

/// Result type for log operations.
pub type LogResult<T> = Result<T, LogError>;

/// Errors that can occur while reading or writing the event log.
#[derive(Debug, Error)]
pub enum LogError {
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be serialized or a stored row could not be parsed.
    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The log contains a frame that cannot be trusted.
    #[error("event log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the offending frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A record with the same timestamp is already present.
    #[error("duplicate record timestamp {0}")]
    DuplicateTimestamp(Timestamp),
}

impl LogError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}
