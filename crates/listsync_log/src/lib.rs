//! # listsync log
//!
//! The durable, append-only event log behind the listsync engine.
//!
//! Every event the engine applies is stored here with its provenance
//! ([`Source::Local`] while it waits in the outbox, [`Source::Remote`] once
//! the server knows it) and a per-process monotonic [`Timestamp`]. The log
//! serves both as the cache state is rebuilt from and as the outbox drained
//! on reconnect.
//!
//! ## On-disk format
//!
//! The log is a sequence of checksummed frames:
//!
//! ```text
//! magic "LSEV" (4) | version (2) | kind (1) | length (4) | payload | crc32 (4)
//! ```
//!
//! `Insert` frames carry the JSON row `{action, timestamp, source, json}`.
//! `Acknowledge` and `Delete` frames carry the 8-byte timestamp of the
//! record they affect, so provenance changes and purges are appends too.
//! [`EventLog::compact`] rewrites the file with live records only.
//!
//! ## Key Invariants
//!
//! - An `append` has been synced to the backend before it returns
//! - Records are never mutated in memory without a matching frame on disk
//! - Query results are ordered by timestamp ascending

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod error;
mod frame;
mod log;
mod record;
mod replay;

pub use clock::Clock;
pub use error::{LogError, LogResult};
pub use log::{CompactStats, EventLog, LogStats};
pub use record::{EventRow, Source, StoredEvent, Timestamp};
pub use replay::rebuild_state;
