//! Status values and the state published to observers.

use listsync_protocol::ShoppingList;
use std::fmt;

/// The engine's sync status.
///
/// ```text
/// Offline ──snapshot──▶ SendingStoredEvents ──outbox drained──▶ Online
///    ▲                          │                                 │
///    └──────────── disconnect ──┴─────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncStatus {
    /// No authoritative snapshot on the current connection.
    #[default]
    Offline,
    /// Resending stored local events on top of a fresh snapshot.
    SendingStoredEvents,
    /// Outbox drained; new events are sent as they are dispatched.
    Online,
}

impl SyncStatus {
    /// Returns true if dispatched events are sent immediately.
    pub fn sends_immediately(&self) -> bool {
        matches!(self, SyncStatus::SendingStoredEvents | SyncStatus::Online)
    }

    /// Returns a short lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Offline => "offline",
            SyncStatus::SendingStoredEvents => "sending-stored-events",
            SyncStatus::Online => "online",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication progress on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoginState {
    /// No session.
    #[default]
    LoggedOut,
    /// A login request is awaiting its response.
    LoggingIn,
    /// The server accepted a login.
    LoggedIn,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoginState::LoggedOut => "logged-out",
            LoginState::LoggingIn => "logging-in",
            LoginState::LoggedIn => "logged-in",
        })
    }
}

/// Everything a presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishedState {
    /// Current lists, including optimistic local edits.
    pub lists: Vec<ShoppingList>,
    /// Sync status.
    pub status: SyncStatus,
    /// Whether the transport currently has a connection.
    pub connected: bool,
    /// Authentication progress.
    pub login: LoginState,
    /// Local events the server has not acknowledged yet.
    pub pending: usize,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Local events persisted through `dispatch`.
    pub events_dispatched: u64,
    /// Events handed to the transport, including resends.
    pub events_sent: u64,
    /// Acknowledgments that retired a local record.
    pub events_acked: u64,
    /// Acknowledgments that found no local record.
    pub late_acks: u64,
    /// Remote non-snapshot events applied.
    pub remote_events_applied: u64,
    /// Snapshots applied.
    pub snapshots_applied: u64,
    /// Inbound frames the transport could not decode.
    pub decode_drops: u64,
    /// Last error the engine recovered from.
    pub last_error: Option<String>,
}
