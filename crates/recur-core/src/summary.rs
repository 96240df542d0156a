//! Recurring cost summary over detected patterns

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Frequency, RecurringPattern};

/// Default horizon for the upcoming list
pub const DEFAULT_UPCOMING_DAYS: i64 = 30;

/// Aggregate view of the patterns a user is tracking
///
/// Only active, non-ignored patterns are counted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurringSummary {
    pub today: NaiveDate,
    pub count: usize,
    pub by_frequency: BTreeMap<Frequency, usize>,
    pub monthly_cost: Decimal,
    pub yearly_cost: Decimal,
    /// Patterns whose next expected date has passed, oldest first
    pub overdue: Vec<RecurringPattern>,
    /// Patterns expected within the horizon, soonest first
    pub upcoming: Vec<RecurringPattern>,
}

impl RecurringSummary {
    pub fn from_patterns(
        patterns: &[RecurringPattern],
        today: NaiveDate,
        upcoming_days: i64,
    ) -> Result<Self> {
        let tracked: Vec<&RecurringPattern> =
            patterns.iter().filter(|p| p.is_tracked()).collect();

        let mut by_frequency = BTreeMap::new();
        for pattern in &tracked {
            *by_frequency.entry(pattern.frequency).or_insert(0) += 1;
        }

        let monthly_cost = total_cost(&tracked, RecurringPattern::monthly_cost)?;
        let yearly_cost = total_cost(&tracked, RecurringPattern::yearly_cost)?;

        let mut overdue: Vec<RecurringPattern> = tracked
            .iter()
            .filter(|p| p.is_overdue(today))
            .map(|p| (*p).clone())
            .collect();
        overdue.sort_by(|a, b| by_next_date(a, b));

        let mut upcoming: Vec<RecurringPattern> = tracked
            .iter()
            .filter(|p| (0..=upcoming_days).contains(&p.days_until_next(today)))
            .map(|p| (*p).clone())
            .collect();
        upcoming.sort_by(|a, b| by_next_date(a, b));

        Ok(Self {
            today,
            count: tracked.len(),
            by_frequency,
            monthly_cost: monthly_cost.round_dp(2),
            yearly_cost: yearly_cost.round_dp(2),
            overdue,
            upcoming,
        })
    }
}

fn total_cost(
    patterns: &[&RecurringPattern],
    cost: fn(&RecurringPattern) -> Option<Decimal>,
) -> Result<Decimal> {
    patterns.iter().try_fold(Decimal::ZERO, |total, pattern| {
        cost(pattern)
            .and_then(|c| total.checked_add(c))
            .ok_or_else(|| {
                Error::InvalidData(format!(
                    "recurring cost overflows at pattern {}",
                    pattern.identity_key
                ))
            })
    })
}

fn by_next_date(a: &RecurringPattern, b: &RecurringPattern) -> std::cmp::Ordering {
    a.next_expected_date
        .cmp(&b.next_expected_date)
        .then_with(|| a.display_name.cmp(&b.display_name))
}
