//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// KREPS - duel shell
#[derive(Parser)]
#[command(
    name = "kreps",
    about = "Two-process signal duel with an interactive shell",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fight one duel and print how it ended
    Duel {
        /// Print every protocol step of both participants
        #[arg(short, long)]
        verbose: bool,
    },

    /// Start the interactive shell (default)
    Shell {
        /// Commands to run before the first prompt
        #[arg(value_name = "COMMAND")]
        commands: Vec<String>,
    },

    /// Internal: play the challenger side of a duel (spawned by `duel`)
    #[command(hide = true)]
    Challenger {
        /// JSON parameter block from the initiator
        #[arg(long)]
        params: String,
    },
}

/// Path of the shared log file
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kreps")
        .join("logs")
        .join("kreps.log")
}
