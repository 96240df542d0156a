//! Picks one frequency per group among the eligible hypotheses

use std::cmp::Ordering;

use super::scorer::HypothesisScore;

/// Composite scores closer than this are treated as equal
const SCORE_EPSILON: f64 = 1e-9;

/// Best composite score wins; ties go to higher priority, then higher
/// calibrated confidence
#[derive(Debug, Clone, Copy, Default)]
pub struct BestMatchSelector;

impl BestMatchSelector {
    pub fn select<'s>(&self, scores: &'s [HypothesisScore]) -> Option<&'s HypothesisScore> {
        scores
            .iter()
            .filter(|s| s.eligible)
            .max_by(|a, b| compare(a, b))
    }
}

fn compare(a: &HypothesisScore, b: &HypothesisScore) -> Ordering {
    let diff = a.composite_score - b.composite_score;
    if diff.abs() > SCORE_EPSILON {
        return if diff > 0.0 {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    a.frequency
        .priority()
        .cmp(&b.frequency.priority())
        .then_with(|| {
            a.calibrated_confidence
                .partial_cmp(&b.calibrated_confidence)
                .unwrap_or(Ordering::Equal)
        })
}
