//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// Comma or tab separated logbook export
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Name of the user the rows belong to
    #[arg(short, long)]
    pub user: String,

    /// Read the file as tab separated instead of guessing
    #[arg(long)]
    pub tsv: bool,

    /// Store the rows instead of only previewing them
    #[arg(long)]
    pub commit: bool,

    /// Output a JSON summary instead of HTML
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only count rows belonging to this user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
