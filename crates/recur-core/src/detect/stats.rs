//! Interval and amount statistics for a candidate group

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;

use super::grouper::CandidateGroup;

/// Date-gap and amount statistics of one candidate group
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalStats {
    /// Days between consecutive occurrences
    pub deltas: Vec<i64>,
    pub mean_abs_amount: f64,
    /// Mean of |abs(amount) - mean| / mean; None when the mean amount is zero
    pub amount_spread: Option<f64>,
    pub occurrence_count: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

/// Compute statistics for a group whose members are ordered by date
///
/// Returns None when the group has fewer than two distinct dates: no interval
/// can be measured, so no frequency can be scored.
pub fn analyze(group: &CandidateGroup<'_>) -> Option<IntervalStats> {
    let first_date = group.members.first()?.date;
    let last_date = group.members.last()?.date;
    if first_date == last_date {
        return None;
    }

    let deltas: Vec<i64> = group
        .members
        .windows(2)
        .map(|w| (w[1].date - w[0].date).num_days())
        .collect();

    let amounts: Vec<f64> = group
        .members
        .iter()
        .map(|m| m.amount.abs().to_f64().unwrap_or(0.0))
        .collect();
    let mean_abs_amount = mean(amounts.iter().copied());
    let amount_spread = if mean_abs_amount > 0.0 {
        Some(mean(
            amounts
                .iter()
                .map(|a| (a - mean_abs_amount).abs() / mean_abs_amount),
        ))
    } else {
        None
    };

    Some(IntervalStats {
        deltas,
        mean_abs_amount,
        amount_spread,
        occurrence_count: group.members.len(),
        first_date,
        last_date,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
