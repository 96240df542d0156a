//! Detection command
//!
//! Each account runs on its own blocking task; the detector holds only
//! configuration and is shared between them.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use recur_core::import::{
    load_patterns, load_transactions_file, partition_by_account, save_patterns,
};
use recur_core::{DetectionReport, DetectorConfig, RecurringDetector, RecurringPattern, Transaction};
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::{short_key, truncate};

/// Options of `recur detect`
#[derive(Debug, Clone)]
pub struct DetectOptions {
    pub input: PathBuf,
    pub patterns: PathBuf,
    pub account: Option<i64>,
    pub lookback_days: Option<u32>,
    pub dry_run: bool,
    pub json: bool,
}

pub async fn cmd_detect(config: DetectorConfig, options: &DetectOptions) -> Result<()> {
    let lookback_days = options.lookback_days.unwrap_or(config.lookback_days);

    let transactions = load_transactions_file(&options.input)
        .with_context(|| format!("Failed to load transactions from {}", options.input.display()))?;
    let mut accounts = partition_by_account(transactions);
    if let Some(account) = options.account {
        accounts.retain(|id, _| *id == account);
    }

    let existing = load_patterns(&options.patterns)
        .with_context(|| format!("Failed to load patterns from {}", options.patterns.display()))?;

    let reports = run_detection(config, accounts, lookback_days, &existing).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(&reports);
    }

    if options.dry_run {
        if !options.json {
            println!();
            println!("Dry run: {} not updated", options.patterns.display());
        }
        return Ok(());
    }

    let merged = merge_patterns(existing, &reports);
    save_patterns(&options.patterns, &merged)
        .with_context(|| format!("Failed to save patterns to {}", options.patterns.display()))?;
    if !options.json {
        println!();
        println!(
            "✅ Saved {} patterns to {}",
            merged.len(),
            options.patterns.display()
        );
    }

    Ok(())
}

/// Detect every account concurrently, returning reports ordered by account
pub async fn run_detection(
    config: DetectorConfig,
    accounts: BTreeMap<i64, Vec<Transaction>>,
    lookback_days: u32,
    existing: &[RecurringPattern],
) -> Result<Vec<DetectionReport>> {
    let detector = Arc::new(RecurringDetector::new(config).context("Invalid detector config")?);

    let mut tasks = JoinSet::new();
    for (account_id, transactions) in accounts {
        let detector = Arc::clone(&detector);
        let window = within_lookback(transactions, lookback_days);
        let previous: Vec<RecurringPattern> = existing
            .iter()
            .filter(|p| p.account_id == account_id)
            .cloned()
            .collect();

        debug!(account_id, transactions = window.len(), "Spawning detection task");
        tasks.spawn_blocking(move || {
            detector.detect_with_report(account_id, &window, lookback_days, &previous)
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let report = joined
            .context("Detection task failed")?
            .context("Detection failed")?;
        reports.push(report);
    }
    reports.sort_by_key(|r| r.account_id);

    info!("Detected patterns for {} accounts", reports.len());
    Ok(reports)
}

/// Keep the transactions within `lookback_days` of the newest one
///
/// Undated rows are kept so the detector reports them as skipped.
fn within_lookback(transactions: Vec<Transaction>, lookback_days: u32) -> Vec<Transaction> {
    let Some(newest) = transactions.iter().filter_map(|tx| tx.date).max() else {
        return transactions;
    };
    let cutoff = newest - Duration::days(i64::from(lookback_days));
    transactions
        .into_iter()
        .filter(|tx| tx.date.map_or(true, |date| date >= cutoff))
        .collect()
}

/// Replace the patterns of every processed account, keep the rest
pub fn merge_patterns(
    existing: Vec<RecurringPattern>,
    reports: &[DetectionReport],
) -> Vec<RecurringPattern> {
    let processed: Vec<i64> = reports.iter().map(|r| r.account_id).collect();
    let mut merged: Vec<RecurringPattern> = existing
        .into_iter()
        .filter(|p| !processed.contains(&p.account_id))
        .collect();
    merged.extend(reports.iter().flat_map(|r| r.patterns.iter().cloned()));
    merged.sort_by_key(|p| p.account_id);
    merged
}

fn print_reports(reports: &[DetectionReport]) {
    if reports.is_empty() {
        println!("No transactions to analyze.");
        return;
    }

    for report in reports {
        println!();
        println!("🔍 Account {}", report.account_id);
        println!(
            "   {} transactions, {} groups, {} patterns, {} inactivated, {} skipped",
            report.transactions_considered,
            report.groups_formed,
            report.patterns_detected,
            report.patterns_inactivated,
            report.skipped.len()
        );
        println!("   ─────────────────────────────────────────────────────────────────────");

        for pattern in &report.patterns {
            let status = if pattern.is_ignored {
                "🙈"
            } else if pattern.is_active {
                "🔁"
            } else {
                "💤"
            };
            println!(
                "   {} {:8} {:24} │ {:>10} {:<9} │ {:>3.0}% │ next {}",
                status,
                short_key(&pattern.identity_key),
                truncate(&pattern.display_name, 24),
                pattern.amount.to_string(),
                pattern.frequency.as_str(),
                pattern.confidence_score * 100.0,
                pattern.next_expected_date
            );
        }
    }
}
