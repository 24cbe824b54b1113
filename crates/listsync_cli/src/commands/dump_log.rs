//! Dump log command.
//!
//! Dumps event log records for debugging and inspection.

use listsync_log::{EventLog, EventRow};
use serde::Serialize;
use std::path::Path;

/// Event log information for display.
#[derive(Debug, Serialize)]
struct LogInfo {
    path: String,
    records: usize,
    local: usize,
    remote: usize,
    pending: usize,
    frames: u64,
    bytes: u64,
    rows: Vec<EventRow>,
}

/// Runs the dump log command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let log = EventLog::open_file(path)?;
    let stats = log.stats()?;

    let rows = log
        .query_all()
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|record| record.to_row())
        .collect::<Result<Vec<_>, _>>()?;

    let info = LogInfo {
        path: path.display().to_string(),
        records: stats.records,
        local: stats.local,
        remote: stats.remote,
        pending: log.pending().len(),
        frames: stats.frames,
        bytes: stats.bytes,
        rows,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&info)?),
        _ => print_text_output(&info),
    }

    Ok(())
}

fn print_text_output(info: &LogInfo) {
    println!("Event Log: {}", info.path);
    println!("==========");
    println!(
        "Records: {} ({} local, {} remote, {} pending)",
        info.records, info.local, info.remote, info.pending
    );
    println!("Frames: {} ({} bytes)", info.frames, info.bytes);
    println!();

    if info.rows.is_empty() {
        println!("No records.");
        return;
    }

    for row in &info.rows {
        println!(
            "[{}] {:6} {:18} {}",
            row.timestamp,
            row.source.as_str(),
            row.action,
            row.json
        );
    }
}
