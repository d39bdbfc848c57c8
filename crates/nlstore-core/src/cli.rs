use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::filter::{PriorityFilter, StatusFilter};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "nlstore",
    version,
    about = "nlstore: a storage-synced task list",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Data directory holding the persisted entries.
    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a task.
    Add {
        /// Task title; multiple words are joined with spaces.
        #[arg(required = true)]
        title: Vec<String>,

        #[arg(long)]
        notes: Option<String>,

        /// low, medium or high; anything else falls back to low.
        #[arg(long)]
        priority: Option<String>,
    },

    /// List tasks, optionally narrowed by status, priority and search.
    List {
        #[arg(
            long,
            default_value = "all",
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<StatusFilter>())
        )]
        status: StatusFilter,

        #[arg(
            long,
            default_value = "all",
            value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<PriorityFilter>())
        )]
        priority: PriorityFilter,

        /// Case-insensitive substring match against title and notes.
        #[arg(long, default_value = "")]
        search: String,
    },

    /// Toggle the done flag of a task (id or unique id prefix).
    Done { id: String },

    /// Update title, notes or priority of a task.
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        /// New notes; an empty string clears them.
        #[arg(long)]
        notes: Option<String>,

        /// low, medium or high.
        #[arg(long)]
        priority: Option<String>,
    },

    /// Delete a task.
    Delete { id: String },

    /// Remove all completed tasks.
    ClearCompleted,

    /// Remove the whole collection, persisted entry included.
    Clear,

    /// Write the collection as JSON to stdout.
    Export,

    /// Replace the collection with JSON read from stdin.
    Import,

    /// Show task counts.
    Stats,

    /// Show or set the stored theme value.
    Theme { value: Option<String> },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
