//! Recur CLI - Recurring transaction pattern detector
//!
//! Usage:
//!   recur detect --input FILE      Detect recurring patterns per account
//!   recur patterns                 List detected patterns
//!   recur patterns ignore KEY      Hide a pattern from summaries
//!   recur summary                  Recurring cost summary
//!   recur config                   Show effective detector configuration

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Detect {
            input,
            patterns,
            account,
            lookback_days,
            dry_run,
            json,
        } => {
            let config = commands::load_detector_config(cli.config.as_deref())?;
            let options = commands::DetectOptions {
                input,
                patterns,
                account,
                lookback_days,
                dry_run,
                json,
            };
            commands::cmd_detect(config, &options).await
        }
        Commands::Patterns {
            patterns,
            all,
            action,
        } => match action {
            None => commands::cmd_patterns_list(&patterns, all),
            Some(PatternsAction::Ignore { key }) => {
                commands::cmd_patterns_set_ignored(&patterns, &key, true)
            }
            Some(PatternsAction::Unignore { key }) => {
                commands::cmd_patterns_set_ignored(&patterns, &key, false)
            }
            Some(PatternsAction::Note { key, text }) => {
                commands::cmd_patterns_note(&patterns, &key, &text)
            }
        },
        Commands::Summary {
            patterns,
            today,
            days,
            json,
        } => commands::cmd_summary(&patterns, today.as_deref(), days, json),
        Commands::Config => commands::cmd_config(cli.config.as_deref()),
    }
}
