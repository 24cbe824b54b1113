//! Log records and their provenance.

use listsync_protocol::AppEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a logged event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Issued on this device and not yet confirmed by the server.
    Local,
    /// Received from, or confirmed by, the server.
    Remote,
}

impl Source {
    /// Returns the stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Local => "local",
            Source::Remote => "remote",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Microseconds since the Unix epoch, unique per record.
///
/// Timestamps double as record identity: acknowledgments find their
/// record by timestamp.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Returns the raw microsecond value.
    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event as held by the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    /// The domain event.
    pub event: AppEvent,
    /// Provenance.
    pub source: Source,
    /// Record identity and ordering key.
    pub timestamp: Timestamp,
}

impl StoredEvent {
    /// Creates a record.
    pub fn new(event: AppEvent, source: Source, timestamp: Timestamp) -> Self {
        Self {
            event,
            source,
            timestamp,
        }
    }

    /// Returns true if the record is still waiting in the outbox.
    pub fn is_pending(&self) -> bool {
        self.source == Source::Local && !self.event.is_snapshot()
    }

    /// Converts to the persisted row shape.
    pub fn to_row(&self) -> serde_json::Result<EventRow> {
        Ok(EventRow {
            action: self.event.action().to_string(),
            timestamp: self.timestamp,
            source: self.source,
            json: serde_json::to_string(&self.event)?,
        })
    }

    /// Parses a persisted row.
    pub fn from_row(row: &EventRow) -> serde_json::Result<Self> {
        Ok(Self {
            event: serde_json::from_str(&row.json)?,
            source: row.source,
            timestamp: row.timestamp,
        })
    }
}

/// The persisted row: `{action, timestamp, source, json}`.
///
/// `action` duplicates the discriminant inside `json` so tools can filter
/// rows without decoding the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    /// Event discriminant, e.g. `item.add`.
    pub action: String,
    /// Record timestamp.
    pub timestamp: Timestamp,
    /// Provenance.
    pub source: Source,
    /// Full event payload as JSON text.
    pub json: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_protocol::Item;

    #[test]
    fn row_shape() {
        let record = StoredEvent::new(
            AppEvent::add_item("g1", Item::new("i1", "Milk")),
            Source::Local,
            Timestamp(42),
        );
        let row = record.to_row().unwrap();

        assert_eq!(row.action, "item.add");
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            serde_json::json!({
                "action": "item.add",
                "timestamp": 42,
                "source": "local",
                "json": r#"{"action":"item.add","listId":"g1","item":{"id":"i1","name":"Milk"}}"#
            })
        );
        assert_eq!(StoredEvent::from_row(&row).unwrap(), record);
    }

    #[test]
    fn snapshots_are_never_pending() {
        let snapshot = StoredEvent::new(
            AppEvent::ListsInit { lists: vec![] },
            Source::Local,
            Timestamp(1),
        );
        assert!(!snapshot.is_pending());

        let add = StoredEvent::new(
            AppEvent::delete_item("g1", "i1"),
            Source::Local,
            Timestamp(2),
        );
        assert!(add.is_pending());
        assert!(!StoredEvent { source: Source::Remote, ..add }.is_pending());
    }
}
