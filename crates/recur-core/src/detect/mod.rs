//! Recurring pattern detection
//!
//! Runs one account's transaction window through:
//! - grouping (partner info, merchant info, fuzzy description)
//! - interval statistics
//! - per-frequency hypothesis scoring and best-match selection
//! - pattern assembly and reconciliation with persisted patterns
//!
//! The detector only holds configuration, so one instance can be shared
//! across threads and run concurrently for different accounts.

pub mod assembler;
pub mod grouper;
pub mod scorer;
pub mod selector;
pub mod similarity;
pub mod stats;

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::models::{
    DetectionReport, RecurringPattern, SkipReason, SkippedTransaction, Transaction,
};

use assembler::PatternAssembler;
use grouper::{CandidateGrouper, DatedTransaction};
use scorer::FrequencyScorer;
use selector::BestMatchSelector;
use similarity::{DescriptionNormalizer, TextSimilarity, TokenSetRatio};

/// Main detector that runs the full pipeline
pub struct RecurringDetector {
    grouper: CandidateGrouper,
    scorer: FrequencyScorer,
    selector: BestMatchSelector,
}

impl RecurringDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        Self::with_similarity(config, Box::new(TokenSetRatio))
    }

    /// Use a custom text similarity for the fuzzy description pass
    pub fn with_similarity(
        config: DetectorConfig,
        similarity: Box<dyn TextSimilarity>,
    ) -> Result<Self> {
        config.validate()?;
        let grouper = CandidateGrouper::new(
            DescriptionNormalizer::new()?,
            similarity,
            config.fuzzy,
            config.passes,
        );
        let scorer = FrequencyScorer::new(config.scoring, config.composite);
        Ok(Self {
            grouper,
            scorer,
            selector: BestMatchSelector,
        })
    }

    /// Detect the account's recurring patterns
    ///
    /// `transactions` should already be limited to the account and the
    /// lookback window. Returns the active patterns plus any existing
    /// patterns that are no longer supported (inactive).
    pub fn detect(
        &self,
        account_id: i64,
        transactions: &[Transaction],
        lookback_days: u32,
        existing: &[RecurringPattern],
    ) -> Result<Vec<RecurringPattern>> {
        self.detect_with_report(account_id, transactions, lookback_days, existing)
            .map(|report| report.patterns)
    }

    /// Like [`detect`](Self::detect), with skip reasons and run counters
    pub fn detect_with_report(
        &self,
        account_id: i64,
        transactions: &[Transaction],
        lookback_days: u32,
        existing: &[RecurringPattern],
    ) -> Result<DetectionReport> {
        if lookback_days == 0 {
            return Err(Error::InvalidData("lookback_days must be positive".into()));
        }

        let mut report = DetectionReport {
            account_id,
            ..Default::default()
        };

        let valid = validate_input(account_id, transactions, &mut report.skipped);
        report.transactions_considered = valid.len();
        let window = window_days(&valid, lookback_days);

        let grouping = self.grouper.group(&valid)?;
        report.groups_formed = grouping.groups.len();
        for id in &grouping.ungroupable {
            debug!(transaction_id = id, "Transaction has no groupable text");
            report.skipped.push(SkippedTransaction {
                transaction_id: *id,
                reason: SkipReason::Ungroupable,
            });
        }

        let assembler = PatternAssembler::new(self.grouper.normalizer());
        let mut fresh = Vec::new();
        for group in &grouping.groups {
            let Some(stats) = stats::analyze(group) else {
                debug!(pass = %group.pass, key = %group.key, "Group has no measurable interval");
                continue;
            };
            report.groups_scored += 1;

            let scores = self.scorer.score_all(&stats, group.multiplier, window);
            match self.selector.select(&scores) {
                Some(winner) => {
                    debug!(
                        pass = %group.pass,
                        key = %group.key,
                        frequency = %winner.frequency,
                        confidence = winner.calibrated_confidence,
                        "Selected frequency"
                    );
                    fresh.push(assembler.build(account_id, group, &stats, winner)?);
                }
                None => {
                    debug!(pass = %group.pass, key = %group.key, "No eligible frequency");
                }
            }
        }
        report.patterns_detected = fresh.len();

        let reconciliation = assembler.reconcile(account_id, fresh, existing)?;
        report.patterns_inactivated = reconciliation.inactivated;
        report.patterns = reconciliation.patterns;

        info!(
            "Detection complete for account {}: {} transactions, {} groups ({} scored), {} patterns, {} inactivated, {} skipped",
            account_id,
            report.transactions_considered,
            report.groups_formed,
            report.groups_scored,
            report.patterns_detected,
            report.patterns_inactivated,
            report.skipped.len()
        );

        Ok(report)
    }
}

/// Drop rows the pipeline cannot use, recording why, and order the rest by
/// (date, id)
fn validate_input<'a>(
    account_id: i64,
    transactions: &'a [Transaction],
    skipped: &mut Vec<SkippedTransaction>,
) -> Vec<DatedTransaction<'a>> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut valid = Vec::with_capacity(transactions.len());

    for tx in transactions {
        let reason = if tx.account_id != account_id {
            Some(SkipReason::ForeignAccount)
        } else if !seen.insert(tx.id) {
            Some(SkipReason::DuplicateId)
        } else {
            match (tx.date, tx.amount) {
                (None, _) => Some(SkipReason::MissingDate),
                (_, None) => Some(SkipReason::MissingAmount),
                (Some(date), Some(amount)) => {
                    valid.push(DatedTransaction { tx, date, amount });
                    None
                }
            }
        };

        if let Some(reason) = reason {
            warn!(
                transaction_id = tx.id,
                reason = reason.as_str(),
                "Skipping transaction"
            );
            skipped.push(SkippedTransaction {
                transaction_id: tx.id,
                reason,
            });
        }
    }

    valid.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id().cmp(&b.id())));
    valid
}

/// Days of history the data covers, between 1 and `lookback_days`
fn window_days(valid: &[DatedTransaction<'_>], lookback_days: u32) -> f64 {
    let span = match (valid.first(), valid.last()) {
        (Some(first), Some(last)) => (last.date - first.date).num_days(),
        _ => 0,
    };
    span.clamp(1, i64::from(lookback_days).max(1)) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_LOOKBACK_DAYS;
    use crate::models::{Frequency, GroupingPass};
    use crate::test_utils::{date, every, series, TxBuilder};

    const IBAN: &str = "DE89 3704 0044 0532 0130 00";

    fn detector() -> RecurringDetector {
        RecurringDetector::new(DetectorConfig::default()).unwrap()
    }

    /// Twelve monthly charges, 30 +/- 2 days apart, amounts within 2%
    fn netflix_monthly() -> Vec<Transaction> {
        let offsets = [0, 30, 61, 90, 120, 152, 180, 210, 241, 270, 300, 330];
        let amounts = [
            "-15.99", "-16.15", "-15.83", "-15.99", "-16.10", "-15.90", "-15.99", "-16.05",
            "-15.95", "-15.99", "-16.02", "-15.96",
        ];
        series(1, date(2023, 1, 15), &offsets, &amounts, |b| {
            b.partner(IBAN, "Netflix International")
                .payment_method("SEPA Direct Debit")
                .description("NETFLIX.COM")
        })
    }

    #[test]
    fn test_monthly_partner_subscription() {
        let txs = netflix_monthly();
        let patterns = detector()
            .detect(1, &txs, DEFAULT_LOOKBACK_DAYS, &[])
            .unwrap();

        assert_eq!(patterns.len(), 1);
        let p = &patterns[0];
        assert_eq!(p.frequency, Frequency::Monthly);
        assert_eq!(p.pass, GroupingPass::PartnerInfo);
        assert!(p.confidence_score >= 0.85, "confidence {}", p.confidence_score);
        assert_eq!(p.occurrence_count, 12);
        assert_eq!(p.transaction_ids.len(), 12);
        assert_eq!(p.display_name, "Netflix International");
        assert_eq!(p.days_interval, 30);
        assert_eq!(
            p.next_expected_date,
            p.last_occurrence_date + chrono::Duration::days(30)
        );
        assert!(p.is_active);
    }

    #[test]
    fn test_yearly_merchant_pair() {
        let txs = series(1, date(2023, 3, 1), &[0, 365], &["-49.00"], |b| {
            b.merchant("Amazon Prime").card("card", "visa")
        });
        let patterns = detector().detect(1, &txs, 1825, &[]).unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, Frequency::Yearly);
        assert_eq!(patterns[0].pass, GroupingPass::MerchantInfo);
        assert!((patterns[0].confidence_score - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_gap_outside_tolerance_yields_nothing() {
        let txs = series(1, date(2023, 3, 1), &[0, 200], &["-49.00"], |b| {
            b.merchant("Amazon Prime").card("card", "visa")
        });
        let report = detector().detect_with_report(1, &txs, 1825, &[]).unwrap();

        assert!(report.patterns.is_empty());
        assert_eq!(report.groups_formed, 1);
        assert_eq!(report.groups_scored, 1);
        assert_eq!(report.patterns_detected, 0);
    }

    #[test]
    fn test_thin_transaction_is_ungroupable() {
        let mut txs = netflix_monthly();
        txs.push(TxBuilder::new(100, date(2023, 2, 1), "-3.00").description("#12").build());

        let report = detector().detect_with_report(1, &txs, 1825, &[]).unwrap();

        assert_eq!(report.patterns.len(), 1);
        assert!(!report.patterns[0].transaction_ids.contains(&100));
        assert!(report
            .skipped
            .iter()
            .any(|s| s.transaction_id == 100 && s.reason == SkipReason::Ungroupable));
    }

    #[test]
    fn test_ignored_flag_survives_redetection() {
        let txs = netflix_monthly();
        let d = detector();
        let mut first = d.detect(1, &txs, 1825, &[]).unwrap();
        first[0].is_ignored = true;
        first[0].user_notes = "shared account".to_string();

        let second = d.detect(1, &txs, 1825, &first).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].identity_key, first[0].identity_key);
        assert!(second[0].is_ignored);
        assert_eq!(second[0].user_notes, "shared account");
    }

    #[test]
    fn test_detection_is_idempotent() {
        let mut txs = netflix_monthly();
        txs.extend(series(50, date(2023, 1, 3), &every(7, 20), &["-12.50"], |b| {
            b.merchant("Gym").card("card", "mastercard")
        }));
        txs.extend(series(80, date(2023, 1, 20), &every(30, 8), &["-9.99"], |b| {
            b.description("SPOTIFY P1234")
        }));
        // shuffled input order must not matter
        txs.reverse();

        let d = detector();
        let first = d.detect(1, &txs, 1825, &[]).unwrap();
        let second = d.detect(1, &txs, 1825, &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_partner_pass_takes_precedence() {
        let txs: Vec<Transaction> = netflix_monthly()
            .into_iter()
            .map(|mut tx| {
                tx.merchant_name = "Netflix".to_string();
                tx
            })
            .collect();
        let patterns = detector().detect(1, &txs, 1825, &[]).unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pass, GroupingPass::PartnerInfo);
        assert_eq!(patterns[0].display_name, "Netflix");
    }

    #[test]
    fn test_fuzzy_pattern_confidence_is_scaled() {
        let txs = series(1, date(2023, 1, 20), &every(30, 8), &["-9.99"], |b| {
            b.description("SPOTIFY P1234")
        });
        let patterns = detector().detect(1, &txs, 1825, &[]).unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pass, GroupingPass::DescriptionFuzzy);
        assert_eq!(patterns[0].frequency, Frequency::Monthly);
        assert!((patterns[0].confidence_score - 0.65).abs() < 1e-9);
        assert_eq!(patterns[0].display_name, "SPOTIFY P1234");
    }

    #[test]
    fn test_weekly_merchant_pattern() {
        let txs = series(1, date(2023, 1, 2), &every(7, 10), &["-12.50"], |b| {
            b.merchant("Gym").card("card", "mastercard")
        });
        let patterns = detector().detect(1, &txs, 1825, &[]).unwrap();

        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].frequency, Frequency::Weekly);
        assert_eq!(patterns[0].days_interval, 7);
    }

    #[test]
    fn test_unsupported_pattern_is_inactivated() {
        let d = detector();
        let previous = d.detect(1, &netflix_monthly(), 1825, &[]).unwrap();

        let report = d.detect_with_report(1, &[], 1825, &previous).unwrap();
        assert_eq!(report.patterns.len(), 1);
        assert!(!report.patterns[0].is_active);
        assert_eq!(report.patterns[0].transaction_ids.len(), 12);
        assert_eq!(report.patterns_inactivated, 1);
    }

    #[test]
    fn test_transaction_ids_merge_across_runs() {
        let txs = netflix_monthly();
        let d = detector();
        let first = d.detect(1, &txs[..6], 1825, &[]).unwrap();
        assert_eq!(first.len(), 1);

        let second = d.detect(1, &txs[6..], 1825, &first).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].identity_key, first[0].identity_key);
        // ids accumulate, statistics describe the latest window only
        assert_eq!(second[0].transaction_ids.len(), 12);
        assert_eq!(second[0].occurrence_count, 6);
        assert_eq!(second[0].first_occurrence_date, txs[6].date.unwrap());
        assert_eq!(second[0].last_occurrence_date, txs[11].date.unwrap());
    }

    #[test]
    fn test_shifted_fuzzy_key_does_not_double_link_history() {
        let netflix = |id: i64, offset: i64, text: &str| {
            TxBuilder::new(id, date(2024, 1, 1) + chrono::Duration::days(offset), "-15.99")
                .description(text)
                .build()
        };
        let d = detector();

        let mut window: Vec<Transaction> =
            (1..=3).map(|id| netflix(id, (id - 1) * 30, "NETFLIX")).collect();
        let first = d.detect(1, &window, 1825, &[]).unwrap();
        assert_eq!(first.len(), 1);

        // the premium variant takes over the cluster's most frequent text
        window.extend((4..=7).map(|id| netflix(id, (id - 1) * 30, "NETFLIX PREMIUM")));
        let second = d.detect(1, &window, 1825, &first).unwrap();
        assert_eq!(second.len(), 2);
        assert!(second[0].is_active);
        assert_eq!(second[0].transaction_ids.len(), 7);
        assert!(!second[1].is_active);
        assert_eq!(second[1].identity_key, first[0].identity_key);

        // both keys form groups again once the history left the window
        let third_window = vec![
            netflix(20, 300, "PREMIUM"),
            netflix(21, 315, "NETFLIX"),
            netflix(22, 330, "NETFLIX PREMIUM"),
            netflix(23, 345, "NETFLIX"),
            netflix(24, 360, "NETFLIX PREMIUM"),
            netflix(25, 375, "NETFLIX"),
            netflix(26, 390, "NETFLIX PREMIUM"),
            netflix(27, 405, "NETFLIX"),
        ];
        let third = d.detect(1, &third_window, 1825, &second).unwrap();
        assert_eq!(third.len(), 2);
        assert!(third.iter().all(|p| p.is_active));

        let premium = third
            .iter()
            .find(|p| p.identity_key == second[0].identity_key)
            .unwrap();
        let plain = third
            .iter()
            .find(|p| p.identity_key == first[0].identity_key)
            .unwrap();
        assert_eq!(
            premium.transaction_ids.iter().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6, 7, 20, 22, 24, 26]
        );
        assert_eq!(
            plain.transaction_ids.iter().copied().collect::<Vec<_>>(),
            vec![21, 23, 25, 27]
        );
    }

    #[test]
    fn test_empty_window() {
        let patterns = detector().detect(1, &[], 1825, &[]).unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let mut txs = netflix_monthly();
        txs.push(TxBuilder::new(200, date(2023, 5, 1), "-1.00").no_date().build());
        txs.push(TxBuilder::new(201, date(2023, 5, 1), "-1.00").no_amount().build());
        txs.push(TxBuilder::new(1, date(2023, 5, 1), "-1.00").build());
        txs.push(TxBuilder::new(202, date(2023, 5, 1), "-1.00").account(2).build());

        let report = detector().detect_with_report(1, &txs, 1825, &[]).unwrap();

        let reasons: Vec<(i64, SkipReason)> = report
            .skipped
            .iter()
            .map(|s| (s.transaction_id, s.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                (200, SkipReason::MissingDate),
                (201, SkipReason::MissingAmount),
                (1, SkipReason::DuplicateId),
                (202, SkipReason::ForeignAccount),
            ]
        );
        assert_eq!(report.transactions_considered, 12);
        assert_eq!(report.patterns.len(), 1);
    }

    #[test]
    fn test_zero_lookback_is_rejected() {
        let result = detector().detect(1, &netflix_monthly(), 0, &[]);
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_custom_similarity() {
        struct NeverSimilar;
        impl TextSimilarity for NeverSimilar {
            fn similarity(&self, _a: &str, _b: &str) -> f64 {
                0.0
            }
        }

        let d =
            RecurringDetector::with_similarity(DetectorConfig::default(), Box::new(NeverSimilar))
                .unwrap();
        // variants that only a similarity function could join
        let txs = vec![
            TxBuilder::new(1, date(2023, 1, 1), "-9.99").description("spotify").build(),
            TxBuilder::new(2, date(2023, 1, 15), "-9.99").description("spotify premium").build(),
            TxBuilder::new(3, date(2023, 1, 31), "-9.99").description("spotify").build(),
        ];
        let patterns = d.detect(1, &txs, 1825, &[]).unwrap();
        // identical texts still cluster
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].transaction_ids.len(), 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = DetectorConfig::default();
        config.passes.merchant_info = 1.5;
        assert!(RecurringDetector::new(config).is_err());
    }

    #[test]
    fn test_detector_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RecurringDetector>();
    }
}
