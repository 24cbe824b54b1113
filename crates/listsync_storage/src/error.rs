//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Another process already holds the log file.
    #[error("storage file is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// A write was refused by the backend.
    #[error("write rejected: {0}")]
    WriteRejected(String),
}

impl StorageError {
    /// Creates an `InvalidInput` I/O error with the given message.
    pub(crate) fn invalid_input(message: String) -> Self {
        Self::Io(io::Error::new(io::ErrorKind::InvalidInput, message))
    }
}
