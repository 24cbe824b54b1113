//! Reconstructing list state from log records.

use crate::record::{Source, StoredEvent};
use listsync_protocol::{fold, AppEvent, ShoppingList};

/// Rebuilds list state from log records.
///
/// The most recent `Remote` snapshot is the seed. Every other record is
/// folded on top in timestamp order, except snapshots older than the seed,
/// which it supersedes.
pub fn rebuild_state<'a, I>(records: I) -> Vec<ShoppingList>
where
    I: IntoIterator<Item = &'a StoredEvent>,
{
    let mut records: Vec<&StoredEvent> = records.into_iter().collect();
    records.sort_by_key(|r| r.timestamp);

    let seed = records
        .iter()
        .rev()
        .find(|r| r.source == Source::Remote && r.event.is_snapshot())
        .copied();

    let (mut state, seed_ts) = match seed {
        Some(StoredEvent {
            event: AppEvent::ListsInit { lists },
            timestamp,
            ..
        }) => (lists.clone(), Some(*timestamp)),
        _ => (Vec::new(), None),
    };

    for record in records {
        if let Some(seed_ts) = seed_ts {
            if record.event.is_snapshot() && record.timestamp <= seed_ts {
                continue;
            }
        }
        state = fold(state, &record.event);
    }
    state
}
