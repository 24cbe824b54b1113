//! Compact command.
//!
//! Rewrites the event log so it holds one insert frame per live record.

use listsync_log::EventLog;
use std::path::Path;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut log = EventLog::open_file(path)?;
    let stats = log.stats()?;

    println!("Compaction Analysis:");
    println!("  Log file: {}", path.display());
    println!("  Current size: {} bytes", stats.bytes);
    println!("  Frames: {}", stats.frames);
    println!("  Live records: {}", stats.records);

    if dry_run {
        let superseded = stats.frames.saturating_sub(stats.records as u64);
        println!();
        println!("Dry run: {} superseded frame(s) would be dropped.", superseded);
        return Ok(());
    }

    let result = log.compact()?;
    let saved = result.bytes_before.saturating_sub(result.bytes_after);
    let percent = if result.bytes_before > 0 {
        (saved as f64 / result.bytes_before as f64) * 100.0
    } else {
        0.0
    };

    println!();
    println!("Compacted to {} bytes", result.bytes_after);
    println!("Space saved: {} bytes ({:.1}%)", saved, percent);

    Ok(())
}
