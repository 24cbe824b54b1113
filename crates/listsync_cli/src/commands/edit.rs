//! Add and delete commands.
//!
//! The event is always persisted first. With `--wait` the command also
//! connects and waits for the server to acknowledge it; otherwise it stays
//! in the outbox until the next connected session.

use listsync_engine::{
    PublishedState, SyncConfig, SyncEngine, SyncError, SyncStatus, WsTransport,
};
use listsync_log::EventLog;
use listsync_protocol::AppEvent;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs an edit command.
pub async fn run(
    path: &Path,
    event: AppEvent,
    wait: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let log = EventLog::open_file(path)?;
    let config = SyncConfig::from_env();
    let transport = WsTransport::connect(&config);
    let (engine, handle) = SyncEngine::new(config, log, transport);
    let task = engine.spawn();

    if let Some(list_id) = target_list(&event) {
        if !handle.state().lists.iter().any(|l| l.id == list_id) {
            warn!(list_id, "list is not known locally; the edit may have no effect");
        }
    }

    handle.dispatch(event).await?;

    let confirmed = match wait.filter(|secs| *secs > 0) {
        None => false,
        Some(secs) => match handle.wait_for(Duration::from_secs(secs), is_synced).await {
            Ok(_) => true,
            Err(SyncError::Timeout) => {
                debug!(secs, "gave up waiting for acknowledgment");
                false
            }
            Err(e) => return Err(e.into()),
        },
    };

    if confirmed {
        println!("Saved and confirmed by the server.");
    } else {
        println!("Saved locally; it will sync on the next connection.");
    }

    handle.shutdown().await?;
    task.await??;
    Ok(())
}

/// True once the outbox, including the edit just made, is acknowledged.
fn is_synced(state: &PublishedState) -> bool {
    state.status == SyncStatus::Online && state.pending == 0
}

fn target_list(event: &AppEvent) -> Option<&str> {
    match event {
        AppEvent::AddItem { list_id, .. } | AppEvent::DeleteItem { list_id, .. } => Some(list_id),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_log::Source;
    use listsync_protocol::Item;
    use tempfile::tempdir;

    #[tokio::test]
    async fn edit_is_saved_even_when_server_never_answers() {
        std::env::set_var(listsync_engine::SERVER_URL_ENV, "ws://127.0.0.1:1/socket");
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        let event = AppEvent::add_item("g1", Item::new("i1", "Milk"));

        run(&path, event.clone(), Some(1)).await.unwrap();

        let log = EventLog::open_file(&path).unwrap();
        let records = log.query_all();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event, event);
        assert_eq!(records[0].source, Source::Local);
    }

    #[test]
    fn synced_needs_online_and_empty_outbox() {
        let mut state = PublishedState {
            status: SyncStatus::Online,
            pending: 1,
            ..PublishedState::default()
        };
        assert!(!is_synced(&state));

        state.pending = 0;
        assert!(is_synced(&state));

        state.status = SyncStatus::SendingStoredEvents;
        assert!(!is_synced(&state));
    }

    #[test]
    fn target_list_of_edits() {
        assert_eq!(
            target_list(&AppEvent::add_item("g1", Item::new("i", "Milk"))),
            Some("g1")
        );
        assert_eq!(target_list(&AppEvent::delete_item("h1", "i")), Some("h1"));
        assert_eq!(target_list(&AppEvent::SuggestionsUpdate), None);
    }
}
