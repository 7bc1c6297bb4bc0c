//! CLI parse: clap types for ctxstack. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ctxstack CLI - per-thread persistence contexts merged into a primary context
#[derive(Parser)]
#[command(name = "ctxstack")]
#[command(about = "Thread-confined persistence contexts with ordered save-merge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (defaults plus CTXSTACK__* environment otherwise)
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
}

#[derive(Subcommand)]
pub enum Commands {
    /// Insert records from worker threads and watch them merge into the primary context
    Demo {
        /// Number of worker threads
        #[arg(long, default_value_t = 4)]
        workers: usize,
        /// Records each worker inserts (one commit per record)
        #[arg(long, default_value_t = 10)]
        records: usize,
        /// Entity to insert
        #[arg(long, default_value = "Note")]
        entity: String,
        /// String property filled with a generated value
        #[arg(long, default_value = "title")]
        field: String,
    },
    /// List the stored objects of an entity
    Inspect {
        /// Entity to list
        entity: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
