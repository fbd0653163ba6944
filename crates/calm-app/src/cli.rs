use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Calm: session presence tracking against a realtime store.
#[derive(Parser, Debug)]
#[command(name = "calm", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log directive override (e.g. "debug", "calm_presence=trace").
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Store URL override (ws:// or wss://).
    #[arg(long, global = true)]
    pub store_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Track this profile's session until Ctrl-C.
    Presence,
    /// Print every session record.
    Sessions,
    /// Print the daily peak of online sessions.
    Stats {
        /// Only this day (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run one stale-session sweep and print what it did.
    Reap,
}

pub fn parse() -> Args {
    Args::parse()
}
