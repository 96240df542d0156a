//! Pattern assembly and reconciliation with persisted patterns

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Duration;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

use super::grouper::{most_frequent, CandidateGroup};
use super::scorer::HypothesisScore;
use super::similarity::DescriptionNormalizer;
use super::stats::IntervalStats;
use crate::error::{Error, Result};
use crate::models::{GroupingPass, RecurringPattern, Transaction};

const UNKNOWN_NAME: &str = "Unknown";

/// Stable identity of a pattern across runs
pub fn identity_key(account_id: i64, pass: GroupingPass, grouping_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", account_id, pass.as_str(), grouping_key).as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of merging a run's patterns with the persisted ones
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub patterns: Vec<RecurringPattern>,
    /// Previously active patterns no group supports anymore
    pub inactivated: usize,
}

pub struct PatternAssembler<'n> {
    normalizer: &'n DescriptionNormalizer,
}

impl<'n> PatternAssembler<'n> {
    pub fn new(normalizer: &'n DescriptionNormalizer) -> Self {
        Self { normalizer }
    }

    /// Build a fresh pattern for a group and its winning hypothesis
    pub fn build(
        &self,
        account_id: i64,
        group: &CandidateGroup<'_>,
        stats: &IntervalStats,
        winner: &HypothesisScore,
    ) -> Result<RecurringPattern> {
        let txs: Vec<&Transaction> = group.members.iter().map(|m| m.tx).collect();

        let merchant_name = most_frequent_field(&txs, |tx| &tx.merchant_name).map(str::to_string);
        let display_name = display_name(&txs);

        let total = group
            .members
            .iter()
            .try_fold(Decimal::ZERO, |total, m| total.checked_add(m.amount))
            .ok_or_else(|| Error::InvalidData(format!("amounts of group {} overflow", group.key)))?;
        let amount = (total / Decimal::from(group.members.len().max(1))).round_dp(2);

        let similar_descriptions: BTreeSet<String> = txs
            .iter()
            .map(|tx| self.normalizer.normalize(&tx.description))
            .filter(|d| !d.is_empty())
            .collect();

        let days_interval = winner.frequency.nominal_days();

        Ok(RecurringPattern {
            identity_key: identity_key(account_id, group.pass, &group.key),
            account_id,
            pass: group.pass,
            display_name,
            merchant_name,
            amount,
            frequency: winner.frequency,
            days_interval,
            confidence_score: winner.calibrated_confidence,
            first_occurrence_date: stats.first_date,
            last_occurrence_date: stats.last_date,
            next_expected_date: stats.last_date + Duration::days(i64::from(days_interval)),
            occurrence_count: stats.occurrence_count,
            is_active: true,
            is_ignored: false,
            similar_descriptions,
            transaction_ids: group.members.iter().map(|m| m.id()).collect(),
            user_notes: String::new(),
        })
    }

    /// Merge this run's patterns into the account's persisted patterns
    ///
    /// Matching patterns take this run's statistics and dates, keep their
    /// user overrides and accumulate transaction ids across runs; unmatched
    /// persisted patterns come back inactive.
    pub fn reconcile(
        &self,
        account_id: i64,
        fresh: Vec<RecurringPattern>,
        existing: &[RecurringPattern],
    ) -> Result<Reconciliation> {
        let mut previous: HashMap<&str, &RecurringPattern> = HashMap::new();
        for pattern in existing {
            if pattern.account_id != account_id {
                warn!(
                    identity_key = %pattern.identity_key,
                    pattern_account = pattern.account_id,
                    account_id,
                    "Ignoring existing pattern of another account"
                );
                continue;
            }
            previous.entry(pattern.identity_key.as_str()).or_insert(pattern);
        }

        let mut matched: HashSet<&str> = HashSet::new();
        let mut carried: Vec<(usize, &RecurringPattern)> = Vec::new();
        let mut patterns = Vec::with_capacity(fresh.len());
        for mut pattern in fresh {
            if let Some(&old) = previous.get(pattern.identity_key.as_str()) {
                matched.insert(old.identity_key.as_str());
                pattern.is_ignored = old.is_ignored;
                pattern.user_notes = old.user_notes.clone();
                pattern
                    .similar_descriptions
                    .extend(old.similar_descriptions.iter().cloned());
                carried.push((patterns.len(), old));
                debug!(identity_key = %pattern.identity_key, "Updated existing pattern");
            } else {
                debug!(identity_key = %pattern.identity_key, "Created new pattern");
            }
            patterns.push(pattern);
        }

        // An old id goes back to at most one pattern: never one this run's
        // groups assigned elsewhere, and previously active patterns first.
        let mut owned: HashSet<i64> = patterns
            .iter()
            .flat_map(|p| p.transaction_ids.iter().copied())
            .collect();
        carried.sort_by_key(|(_, old)| !old.is_active);
        for (index, old) in carried {
            let history: Vec<i64> = old
                .transaction_ids
                .iter()
                .copied()
                .filter(|id| owned.insert(*id))
                .collect();
            patterns[index].transaction_ids.extend(history);
        }

        let mut inactivated = 0;
        let mut seen: HashSet<&str> = HashSet::new();
        for old in existing {
            let key = old.identity_key.as_str();
            if old.account_id != account_id || matched.contains(key) || !seen.insert(key) {
                continue;
            }
            if old.is_active {
                inactivated += 1;
                debug!(identity_key = %old.identity_key, "Inactivating unsupported pattern");
            }
            let mut stale = old.clone();
            stale.is_active = false;
            patterns.push(stale);
        }

        verify_single_owner(&patterns)?;
        patterns.sort_by(compare_output);

        Ok(Reconciliation {
            patterns,
            inactivated,
        })
    }
}

/// merchant > partner > description > reference > "Unknown"
fn display_name(txs: &[&Transaction]) -> String {
    let fields: [fn(&Transaction) -> &String; 4] = [
        |tx| &tx.merchant_name,
        |tx| &tx.partner_name,
        |tx| &tx.description,
        |tx| &tx.reference,
    ];
    fields
        .iter()
        .find_map(|field| most_frequent_field(txs, field))
        .unwrap_or(UNKNOWN_NAME)
        .to_string()
}

fn most_frequent_field<'t>(
    txs: &[&'t Transaction],
    field: impl Fn(&'t Transaction) -> &'t String,
) -> Option<&'t str> {
    most_frequent(
        txs.iter()
            .map(|tx| field(*tx).trim())
            .filter(|value| !value.is_empty()),
    )
}

/// A transaction id may be linked to at most one active pattern
fn verify_single_owner(patterns: &[RecurringPattern]) -> Result<()> {
    let mut owner: HashMap<i64, &str> = HashMap::new();
    for pattern in patterns.iter().filter(|p| p.is_active) {
        for &id in &pattern.transaction_ids {
            if let Some(first) = owner.insert(id, pattern.identity_key.as_str()) {
                error!(
                    transaction_id = id,
                    first = %first,
                    second = %pattern.identity_key,
                    "Transaction linked to two active patterns"
                );
                return Err(Error::InvariantViolation(format!(
                    "transaction {} linked to active patterns {} and {}",
                    id, first, pattern.identity_key
                )));
            }
        }
    }
    Ok(())
}

/// Active first, then confidence desc, occurrences desc, identity key asc
fn compare_output(a: &RecurringPattern, b: &RecurringPattern) -> Ordering {
    b.is_active
        .cmp(&a.is_active)
        .then_with(|| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.occurrence_count.cmp(&a.occurrence_count))
        .then_with(|| a.identity_key.cmp(&b.identity_key))
}
