//! Monotonic record timestamps.

use crate::record::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Issues strictly increasing timestamps.
///
/// Wall-clock time is used while it moves forward; if it stalls or steps
/// back, the clock advances by one microsecond instead.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    last: u64,
}

impl Clock {
    /// Creates a clock whose first timestamp is after `floor`.
    pub fn starting_after(floor: Timestamp) -> Self {
        Self { last: floor.0 }
    }

    /// Returns the next timestamp.
    pub fn next(&mut self) -> Timestamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        self.last = now.max(self.last.saturating_add(1));
        Timestamp(self.last)
    }

    /// Makes sure later timestamps sort after `seen`.
    pub fn observe(&mut self, seen: Timestamp) {
        self.last = self.last.max(seen.0);
    }
}
