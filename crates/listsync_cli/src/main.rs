//! listsync CLI
//!
//! Command-line client for offline-first shopping lists.
//!
//! # Commands
//!
//! - `watch` - Connect and print the lists whenever they change
//! - `add` - Add an item to a list
//! - `delete` - Remove an item from a list
//! - `show` - Print the lists as stored locally
//! - `dump-log` - Dump event log records for debugging
//! - `compact` - Rewrite the event log without superseded frames

mod commands;

use clap::{Parser, Subcommand};
use listsync_protocol::AppEvent;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the event log file.
const LOG_FILE_ENV: &str = "LISTSYNC_LOG_FILE";

/// Log file used when neither the flag nor the variable is set.
const DEFAULT_LOG_FILE: &str = "listsync.log";

/// Offline-first shopping lists from the command line.
#[derive(Parser)]
#[command(name = "listsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the event log file
    #[arg(global = true, short, long)]
    log_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the server and print the lists on every change
    Watch,

    /// Add an item to a list
    Add {
        /// List id
        list: String,

        /// Item name
        name: String,

        /// Seconds to wait for the server to confirm
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Remove an item from a list
    Delete {
        /// List id
        list: String,

        /// Item id
        item: String,

        /// Seconds to wait for the server to confirm
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Print the lists rebuilt from the local log
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump event log records for debugging
    DumpLog {
        /// Maximum number of records to dump
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Rewrite the event log keeping only live records
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Show version information
    Version,
}

/// Picks the log file from the flag, then the environment, then the
/// working directory.
fn resolve_log_path(flag: Option<PathBuf>, env: Option<String>) -> PathBuf {
    flag.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = resolve_log_path(cli.log_file, std::env::var(LOG_FILE_ENV).ok());

    match cli.command {
        Commands::Watch => commands::watch::run(&path).await?,
        Commands::Add { list, name, wait } => {
            let item_id = uuid::Uuid::new_v4().to_string();
            let event = AppEvent::add_item(list, listsync_protocol::Item::new(item_id, name));
            commands::edit::run(&path, event, wait).await?;
        }
        Commands::Delete { list, item, wait } => {
            commands::edit::run(&path, AppEvent::delete_item(list, item), wait).await?;
        }
        Commands::Show { format } => commands::show::run(&path, &format)?,
        Commands::DumpLog { limit, format } => commands::dump_log::run(&path, limit, &format)?,
        Commands::Compact { dry_run } => commands::compact::run(&path, dry_run)?,
        Commands::Version => {
            println!("listsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
