//! CLI command implementations.

pub mod compact;
pub mod dump_log;
pub mod edit;
pub mod show;
pub mod watch;
