//! Summary command implementation

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use recur_core::import::load_patterns;
use recur_core::RecurringSummary;

use super::truncate;

pub fn cmd_summary(path: &Path, today: Option<&str>, days: i64, json: bool) -> Result<()> {
    if days < 0 {
        bail!("--days must not be negative");
    }
    let today = match today {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .context("Invalid --today date format (use YYYY-MM-DD)")?,
        None => Local::now().date_naive(),
    };

    let patterns = load_patterns(path)
        .with_context(|| format!("Failed to load patterns from {}", path.display()))?;
    let summary = RecurringSummary::from_patterns(&patterns, today, days)
        .context("Failed to summarize recurring costs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!();
    println!("💰 Recurring Costs (as of {})", summary.today);
    println!("   ─────────────────────────────");
    println!("   Tracked patterns: {}", summary.count);
    for (frequency, count) in &summary.by_frequency {
        println!("     {:<10} {}", frequency.as_str(), count);
    }
    println!("   Monthly: {}", summary.monthly_cost);
    println!("   Yearly:  {}", summary.yearly_cost);

    if !summary.overdue.is_empty() {
        println!();
        println!("⏰ Overdue");
        for pattern in &summary.overdue {
            println!(
                "   {:24} │ {:>10} │ expected {} ({} days ago)",
                truncate(&pattern.display_name, 24),
                pattern.amount.to_string(),
                pattern.next_expected_date,
                -pattern.days_until_next(summary.today)
            );
        }
    }

    println!();
    if summary.upcoming.is_empty() {
        println!("📅 Nothing expected in the next {} days", days);
    } else {
        println!("📅 Upcoming (next {} days)", days);
        for pattern in &summary.upcoming {
            println!(
                "   {:24} │ {:>10} │ {} (in {} days)",
                truncate(&pattern.display_name, 24),
                pattern.amount.to_string(),
                pattern.next_expected_date,
                pattern.days_until_next(summary.today)
            );
        }
    }

    Ok(())
}
