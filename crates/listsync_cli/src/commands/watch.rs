//! Watch command: stays connected and prints every state change.

use super::show::render_text;
use listsync_engine::{PublishedState, SyncConfig, SyncEngine, WsTransport};
use listsync_log::EventLog;
use std::path::Path;
use tracing::info;

/// Runs the watch command until interrupted.
pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log = EventLog::open_file(path)?;
    let config = SyncConfig::from_env();
    info!(url = %config.server_url, "watching");

    let transport = WsTransport::connect(&config);
    let (engine, handle) = SyncEngine::new(config, log, transport);
    let mut task = engine.spawn();
    let mut updates = handle.subscribe();

    print_state(&updates.borrow_and_update());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                handle.shutdown().await?;
                task.await??;
                return Ok(());
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                print_state(&state);
            }
            result = &mut task => {
                result??;
                return Ok(());
            }
        }
    }

    task.await??;
    Ok(())
}

fn print_state(state: &PublishedState) {
    println!(
        "-- {} | {} | {}",
        state.status,
        if state.connected { "connected" } else { "disconnected" },
        state.login
    );
    print!("{}", render_text(&state.lists, state.pending));
}
