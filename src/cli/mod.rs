//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for gridstats using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// gridstats - electricity and energy statistics pipeline
#[derive(Parser, Debug)]
#[command(name = "gridstats")]
#[command(version, about, long_about = None)]
#[command(author = "Gridstats Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "gridstats.toml", env = "GRIDSTATS_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "GRIDSTATS_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, reconcile and commit a new snapshot
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show source watermarks, the current snapshot and recent runs
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),

    /// List, diff or roll back snapshots
    Snapshots(commands::snapshots::SnapshotsArgs),

    /// Query records of the current (or a retained) snapshot
    Query(commands::query::QueryArgs),
}

impl Commands {
    /// Whether the command needs the configuration file to exist
    pub fn needs_config(&self) -> bool {
        !matches!(self, Commands::Init(_))
    }
}
