//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `config` - Show the effective detector configuration
//! - `detect` - Per-account detection and patterns file update
//! - `patterns` - Pattern listing and user overrides (ignore, notes)
//! - `summary` - Recurring cost summary

pub mod config;
pub mod detect;
pub mod patterns;
pub mod summary;

// Re-export command functions for main.rs
pub use config::*;
pub use detect::*;
pub use patterns::*;
pub use summary::*;

use std::path::Path;

use anyhow::{bail, Context, Result};
use recur_core::{DetectorConfig, RecurringPattern};

/// Load the detector config from an explicit file or the default locations
pub fn load_detector_config(path: Option<&Path>) -> Result<DetectorConfig> {
    match path {
        Some(path) => DetectorConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => DetectorConfig::load().context("Failed to load detector config"),
    }
}

/// Index of the single pattern whose identity key starts with `key`
pub fn find_pattern(patterns: &[RecurringPattern], key: &str) -> Result<usize> {
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        bail!("Pattern key must not be empty");
    }

    let matches: Vec<usize> = patterns
        .iter()
        .enumerate()
        .filter(|(_, p)| p.identity_key.starts_with(&key))
        .map(|(i, _)| i)
        .collect();

    match matches.as_slice() {
        [] => bail!("No pattern matches key: {}", key),
        [index] => Ok(*index),
        _ => bail!(
            "Key {} is ambiguous ({} patterns match), use a longer prefix",
            key,
            matches.len()
        ),
    }
}

/// Short form of an identity key for display
pub fn short_key(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
