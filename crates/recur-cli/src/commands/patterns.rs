//! Pattern command implementations

use std::path::Path;

use anyhow::{Context, Result};
use recur_core::import::{load_patterns, save_patterns};
use recur_core::RecurringPattern;

use super::{find_pattern, short_key, truncate};

pub fn cmd_patterns_list(path: &Path, include_inactive: bool) -> Result<()> {
    let patterns = load_patterns(path)
        .with_context(|| format!("Failed to load patterns from {}", path.display()))?;

    let shown: Vec<&RecurringPattern> = patterns
        .iter()
        .filter(|p| include_inactive || p.is_active)
        .collect();

    if shown.is_empty() {
        println!("No patterns detected yet. Run:");
        println!("  recur detect --input transactions.csv");
        return Ok(());
    }

    println!();
    println!("📋 Recurring Patterns");
    println!("   ─────────────────────────────────────────────────────────────────────");

    for pattern in shown {
        let status = if pattern.is_ignored {
            "🙈"
        } else if pattern.is_active {
            "🔁"
        } else {
            "💤"
        };
        println!(
            "   {} {:8} {:24} │ {:>10}/{:<9} │ acct {:<4} │ since {}",
            status,
            short_key(&pattern.identity_key),
            truncate(&pattern.display_name, 24),
            pattern.amount.to_string(),
            pattern.frequency.as_str(),
            pattern.account_id,
            pattern.first_occurrence_date
        );
        if !pattern.user_notes.is_empty() {
            println!("      📝 {}", pattern.user_notes);
        }
    }

    Ok(())
}

pub fn cmd_patterns_set_ignored(path: &Path, key: &str, ignored: bool) -> Result<()> {
    update_pattern(path, key, |pattern| pattern.is_ignored = ignored)?;
    if ignored {
        println!("🙈 Pattern ignored: excluded from summaries, kept on re-detection");
    } else {
        println!("🔁 Pattern tracked again");
    }
    Ok(())
}

pub fn cmd_patterns_note(path: &Path, key: &str, text: &str) -> Result<()> {
    update_pattern(path, key, |pattern| pattern.user_notes = text.trim().to_string())?;
    println!("📝 Note saved");
    Ok(())
}

/// Apply a user override to one pattern and write the file back
fn update_pattern(path: &Path, key: &str, apply: impl FnOnce(&mut RecurringPattern)) -> Result<()> {
    let mut patterns = load_patterns(path)
        .with_context(|| format!("Failed to load patterns from {}", path.display()))?;
    let index = find_pattern(&patterns, key)?;

    apply(&mut patterns[index]);
    println!(
        "   {} ({})",
        patterns[index].display_name,
        short_key(&patterns[index].identity_key)
    );

    save_patterns(path, &patterns)
        .with_context(|| format!("Failed to save patterns to {}", path.display()))?;
    Ok(())
}
