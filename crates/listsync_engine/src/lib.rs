//! # listsync engine
//!
//! Offline-first sync engine for shopping lists.
//!
//! This crate provides:
//! - The sync status machine (offline → sending stored events → online)
//! - Snapshot reconciliation over locally queued events
//! - Outbox draining with per-event acknowledgments
//! - A transport abstraction with a websocket implementation and a mock
//! - Reconnect backoff configuration
//!
//! ## Architecture
//!
//! The engine is an actor. [`SyncEngine`] owns the [`EventLog`] and the
//! derived lists; every caller talks to it through a cloneable
//! [`SyncHandle`], and every observer reads [`PublishedState`] from a
//! watch channel. Connectivity changes, inbound messages and receipts
//! from the transport are queued onto the same task, so no two log
//! mutations ever interleave.
//!
//! ## Key Invariants
//!
//! - Published lists equal the latest snapshot with pending local events
//!   folded on top, followed by remote events in arrival order
//! - A local event is durable before it is sent
//! - Local events are sent in dispatch order
//! - Receipts retire a record at most once
//!
//! [`EventLog`]: listsync_log::EventLog

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod state;
mod transport;
mod ws;

pub use config::{
    RetryConfig, SyncConfig, DEFAULT_SERVER_URL, SERVER_URL_ENV, SESSION_TOKEN_ENV,
};
pub use engine::{SyncEngine, SyncHandle};
pub use error::{SyncError, SyncResult};
pub use state::{LoginState, PublishedState, SyncStats, SyncStatus};
pub use transport::{AckCallback, ConnectionStatus, MockTransport, SyncTransport};
pub use ws::{TransportState, WsTransport};
