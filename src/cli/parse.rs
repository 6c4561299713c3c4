//! CLI parse: clap types for periodguard. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// periodguard - keep the active accounting period stable across imports
#[derive(Parser)]
#[command(name = "periodguard")]
#[command(about = "Keeps the active accounting period stable across data imports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed a script of host log lines and JSON events through the guard
    Replay {
        /// Script path; one log line, JSON host event, or directive per line
        script: PathBuf,
        /// Number of refresh attempts that fail before one succeeds
        #[arg(long, default_value = "0")]
        fail_refreshes: u32,
        /// Start from this period instead of the persisted one
        #[arg(long)]
        initial_period: Option<i64>,
        /// Summary format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the current period, coordinator state, and last import
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show the persisted period change history
    History {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
        /// Show only the newest N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Manually select a period
    Set {
        period: i64,
        /// Also select a month (1-12)
        #[arg(long)]
        month: Option<i64>,
    },
    /// Print the effective configuration as TOML
    Config,
}
