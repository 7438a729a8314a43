//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::report::ReportArgs;
use crate::commands::sync::SyncArgs;
use crate::commands::ticket::TicketArgs;

/// Group assignment history for GLPI tickets.
///
/// Replays ticket audit logs into per-group ownership intervals and reports
/// how long each support group held tickets.
#[derive(Debug, Parser)]
#[command(name = "ts", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch and store assignment history for a range of tickets.
    Sync(SyncArgs),

    /// Show the live assignment history of one ticket.
    Ticket(TicketArgs),

    /// Summarize stored durations per group.
    Report(ReportArgs),

    /// Show database location and processing counts.
    Status,
}
