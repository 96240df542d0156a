//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Recur - Find the recurring charges in your bank history
#[derive(Parser)]
#[command(name = "recur")]
#[command(about = "Recurring transaction pattern detector", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Detector config override (TOML)
    ///
    /// Defaults to ~/.local/share/recur/config/detector.toml when present,
    /// otherwise the built-in configuration.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect recurring patterns in a transaction window
    Detect {
        /// Transaction file (CSV with header row, or .json array)
        #[arg(short, long)]
        input: PathBuf,

        /// Patterns file to reconcile with and update
        #[arg(short, long, default_value = "patterns.json")]
        patterns: PathBuf,

        /// Only process this account
        #[arg(short, long)]
        account: Option<i64>,

        /// Days of history to consider (defaults to the configured lookback)
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Print results without updating the patterns file
        #[arg(long)]
        dry_run: bool,

        /// Print detection reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// List and annotate detected patterns
    Patterns {
        /// Patterns file
        #[arg(short, long, default_value = "patterns.json")]
        patterns: PathBuf,

        /// Include inactive patterns
        #[arg(long)]
        all: bool,

        #[command(subcommand)]
        action: Option<PatternsAction>,
    },

    /// Show recurring cost summary
    Summary {
        /// Patterns file
        #[arg(short, long, default_value = "patterns.json")]
        patterns: PathBuf,

        /// Reference date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        today: Option<String>,

        /// Horizon for upcoming charges in days
        #[arg(long, default_value = "30")]
        days: i64,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective detector configuration
    Config,
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// Ignore a pattern (kept across re-detection, excluded from summaries)
    Ignore {
        /// Identity key or unique prefix
        key: String,
    },

    /// Stop ignoring a pattern
    Unignore {
        /// Identity key or unique prefix
        key: String,
    },

    /// Attach a note to a pattern
    Note {
        /// Identity key or unique prefix
        key: String,

        /// Note text (empty clears the note)
        text: String,
    },
}
