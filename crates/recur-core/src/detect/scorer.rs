//! Per-frequency hypothesis scoring
//!
//! Every frequency is scored independently against a group's statistics. The
//! selector then picks one winner among the eligible hypotheses.

use tracing::debug;

use super::stats::IntervalStats;
use crate::config::{CompositeWeights, ScoringConfig};
use crate::models::Frequency;

/// Highest frequency priority, used to normalize the priority term
const MAX_PRIORITY: f64 = 5.0;

/// Score of one frequency hypothesis for one group
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisScore {
    pub frequency: Frequency,
    pub interval_consistency: f64,
    pub amount_consistency: f64,
    pub occurrence_ratio: f64,
    pub raw_confidence: f64,
    /// Raw confidence scaled by the grouping pass multiplier
    pub calibrated_confidence: f64,
    pub composite_score: f64,
    pub occurrence_count: usize,
    pub eligible: bool,
}

#[derive(Debug, Clone)]
pub struct FrequencyScorer {
    scoring: ScoringConfig,
    composite: CompositeWeights,
}

impl FrequencyScorer {
    pub fn new(scoring: ScoringConfig, composite: CompositeWeights) -> Self {
        Self { scoring, composite }
    }

    /// Score all five hypotheses
    ///
    /// `window_days` is the span of history covered by the run's data.
    pub fn score_all(
        &self,
        stats: &IntervalStats,
        multiplier: f64,
        window_days: f64,
    ) -> Vec<HypothesisScore> {
        Frequency::ALL
            .iter()
            .map(|&frequency| self.score(frequency, stats, multiplier, window_days))
            .collect()
    }

    pub fn score(
        &self,
        frequency: Frequency,
        stats: &IntervalStats,
        multiplier: f64,
        window_days: f64,
    ) -> HypothesisScore {
        let nominal = f64::from(frequency.nominal_days());

        let interval_consistency = self.interval_consistency(&stats.deltas, nominal);
        let amount_consistency = match stats.amount_spread {
            Some(spread) => 1.0 - (spread / self.scoring.amount_tolerance).min(1.0),
            None => 0.0,
        };
        let expected = window_days.max(1.0) / nominal;
        let occurrence_ratio = (stats.occurrence_count as f64 / expected).min(1.0);

        let raw_confidence = self.scoring.interval_weight * clamp_unit(interval_consistency)
            + self.scoring.amount_weight * clamp_unit(amount_consistency)
            + self.scoring.occurrence_weight * clamp_unit(occurrence_ratio);
        let raw_confidence = clamp_unit(raw_confidence);
        let calibrated_confidence = raw_confidence * multiplier;

        let priority = f64::from(frequency.priority()) / MAX_PRIORITY;
        let composite_score = calibrated_confidence * self.composite.confidence_weight
            + priority * self.composite.priority_weight
            + occurrence_ratio * self.composite.occurrence_weight
            + interval_consistency * self.composite.interval_accuracy_weight;

        let eligible = stats.occurrence_count >= frequency.min_occurrences()
            && calibrated_confidence >= self.scoring.min_confidence;

        if !eligible {
            debug!(
                frequency = %frequency,
                occurrences = stats.occurrence_count,
                calibrated = calibrated_confidence,
                "Hypothesis rejected"
            );
        }

        HypothesisScore {
            frequency,
            interval_consistency,
            amount_consistency,
            occurrence_ratio,
            raw_confidence,
            calibrated_confidence,
            composite_score,
            occurrence_count: stats.occurrence_count,
            eligible,
        }
    }

    /// `1 - min(1, mean deviation)`; deltas outside the tolerance band count as
    /// a full deviation
    fn interval_consistency(&self, deltas: &[i64], nominal: f64) -> f64 {
        if deltas.is_empty() {
            return 0.0;
        }
        let total: f64 = deltas
            .iter()
            .map(|&delta| {
                let deviation = (delta as f64 - nominal).abs() / nominal;
                if deviation > self.scoring.interval_tolerance {
                    1.0
                } else {
                    deviation
                }
            })
            .sum();
        1.0 - (total / deltas.len() as f64).min(1.0)
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    fn scorer() -> FrequencyScorer {
        FrequencyScorer::new(ScoringConfig::default(), CompositeWeights::default())
    }

    fn stats(deltas: Vec<i64>, amount_spread: Option<f64>) -> IntervalStats {
        let span: i64 = deltas.iter().sum();
        let first = date(2024, 1, 1);
        IntervalStats {
            occurrence_count: deltas.len() + 1,
            mean_abs_amount: 15.99,
            amount_spread,
            first_date: first,
            last_date: first + chrono::Duration::days(span),
            deltas,
        }
    }

    fn find(scores: &[HypothesisScore], frequency: Frequency) -> &HypothesisScore {
        scores.iter().find(|s| s.frequency == frequency).unwrap()
    }

    #[test]
    fn test_regular_monthly_scores_high() {
        let s = stats(vec![30, 31, 29, 30, 32, 28, 30, 31, 29, 30, 30], Some(0.01));
        let scores = scorer().score_all(&s, 1.0, 330.0);
        let monthly = find(&scores, Frequency::Monthly);

        assert!(monthly.interval_consistency > 0.95);
        assert!((monthly.amount_consistency - 0.8).abs() < 1e-9);
        assert_eq!(monthly.occurrence_ratio, 1.0);
        assert!(monthly.calibrated_confidence >= 0.85);
        assert!(monthly.eligible);

        for other in [
            Frequency::Weekly,
            Frequency::BiWeekly,
            Frequency::Quarterly,
            Frequency::Yearly,
        ] {
            assert!(!find(&scores, other).eligible, "{} should be ineligible", other);
        }
    }

    #[test]
    fn test_deltas_outside_tolerance_have_zero_consistency() {
        let s = stats(vec![200], Some(0.0));
        let scores = scorer().score_all(&s, 0.85, 200.0);
        for score in &scores {
            assert_eq!(score.interval_consistency, 0.0);
            assert!(!score.eligible);
        }
    }

    #[test]
    fn test_yearly_pair_is_eligible_for_merchant_pass() {
        let s = stats(vec![365], Some(0.0));
        let yearly = scorer().score(Frequency::Yearly, &s, 0.85, 365.0);
        assert!((yearly.raw_confidence - 1.0).abs() < 1e-9);
        assert!((yearly.calibrated_confidence - 0.85).abs() < 1e-9);
        assert!(yearly.eligible);
    }

    #[test]
    fn test_minimum_occurrences_gate() {
        let mut s = stats(vec![365], Some(0.0));
        s.occurrence_count = 1;
        let yearly = scorer().score(Frequency::Yearly, &s, 1.0, 365.0);
        assert!(yearly.calibrated_confidence >= 0.6);
        assert!(!yearly.eligible);

        // weekly needs three occurrences
        let s = stats(vec![7], Some(0.0));
        let weekly = scorer().score(Frequency::Weekly, &s, 1.0, 7.0);
        assert!(!weekly.eligible);
    }

    #[test]
    fn test_calibrated_never_exceeds_raw() {
        let s = stats(vec![30, 30, 30], Some(0.02));
        for multiplier in [0.65, 0.85, 1.0] {
            for score in scorer().score_all(&s, multiplier, 90.0) {
                assert!(score.calibrated_confidence <= score.raw_confidence);
            }
        }
    }

    #[test]
    fn test_undefined_amount_spread_scores_zero() {
        let s = stats(vec![30, 30], None);
        let monthly = scorer().score(Frequency::Monthly, &s, 1.0, 60.0);
        assert_eq!(monthly.amount_consistency, 0.0);
        assert!((monthly.raw_confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_composite_uses_priority() {
        let s = stats(vec![30, 30], Some(0.0));
        let monthly = scorer().score(Frequency::Monthly, &s, 1.0, 60.0);
        // 1.0*0.5 + 3/5*0.2 + 1.0*0.2 + 1.0*0.1
        assert!((monthly.composite_score - 0.92).abs() < 1e-9);
    }
}
