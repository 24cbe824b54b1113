//! # listsync storage
//!
//! Byte-level storage backends for the listsync event log.
//!
//! Backends are **opaque byte stores**: they append, read back, truncate and
//! atomically rewrite bytes. Record framing, checksums and provenance live
//! in `listsync_log`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral sessions
//! - [`FileBackend`] - Persistent, exclusively locked log file
//!
//! ## Example
//!
//! ```rust
//! use listsync_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
