//! Show command: prints the lists rebuilt from the local log.

use listsync_log::EventLog;
use listsync_protocol::ShoppingList;
use serde::Serialize;
use std::fmt::Write;
use std::path::Path;

/// Lists plus the number of edits not yet confirmed by the server.
#[derive(Debug, Serialize)]
struct ShowOutput<'a> {
    lists: &'a [ShoppingList],
    pending: usize,
}

/// Runs the show command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let log = EventLog::open_file(path)?;
    let lists = log.rebuild_state();
    let pending = log.pending().len();

    match format {
        "json" => {
            let output = ShowOutput {
                lists: &lists,
                pending,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print!("{}", render_text(&lists, pending)),
    }

    Ok(())
}

/// Renders lists as indented text.
pub fn render_text(lists: &[ShoppingList], pending: usize) -> String {
    let mut out = String::new();

    if lists.is_empty() {
        out.push_str("No lists. Connect once to fetch them from the server.\n");
    }
    for list in lists {
        let _ = writeln!(out, "{} ({})", list.name, list.id);
        if list.items.is_empty() {
            out.push_str("  (empty)\n");
        }
        for item in &list.items {
            let _ = writeln!(out, "  - {} [{}]", item.name, item.id);
        }
    }
    if pending > 0 {
        let _ = writeln!(out, "{} edit(s) waiting to sync", pending);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use listsync_protocol::{AppEvent, Item};
    use listsync_log::Source;
    use tempfile::tempdir;

    #[test]
    fn render_lists_and_pending() {
        let lists = vec![
            ShoppingList::new("g1", "Groceries").with_item(Item::new("i1", "Milk")),
            ShoppingList::new("h1", "Hardware"),
        ];
        let text = render_text(&lists, 2);

        assert_eq!(
            text,
            "Groceries (g1)\n  - Milk [i1]\nHardware (h1)\n  (empty)\n2 edit(s) waiting to sync\n"
        );
    }

    #[test]
    fn render_empty() {
        assert!(render_text(&[], 0).starts_with("No lists."));
    }

    #[test]
    fn show_reads_log_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        {
            let mut log = EventLog::open_file(&path).unwrap();
            log.record(
                AppEvent::ListsInit {
                    lists: vec![ShoppingList::new("g1", "Groceries")],
                },
                Source::Remote,
            )
            .unwrap();
            log.record(
                AppEvent::add_item("g1", Item::new("i1", "Milk")),
                Source::Local,
            )
            .unwrap();
        }

        run(&path, "json").unwrap();
        run(&path, "text").unwrap();
    }
}
