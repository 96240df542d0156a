//! Recur Core Library
//!
//! Recurring transaction pattern detection for bank account histories:
//! - Three-pass candidate grouping (partner, merchant, fuzzy description)
//! - Competing frequency hypotheses with composite scoring
//! - Reconciliation with previously persisted patterns
//! - Transaction window loaders and pattern persistence
//! - Recurring cost summaries

pub mod config;
pub mod detect;
pub mod error;
pub mod import;
pub mod models;
pub mod summary;

/// Test utilities: transaction builders and date helpers
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{DetectorConfig, DEFAULT_LOOKBACK_DAYS};
pub use detect::similarity::{TextSimilarity, TokenSetRatio};
pub use detect::RecurringDetector;
pub use error::{Error, Result};
pub use models::{
    DetectionReport, Frequency, GroupingPass, RecurringPattern, SkipReason, SkippedTransaction,
    Transaction,
};
pub use summary::RecurringSummary;

/// Detect recurring patterns with the default configuration
///
/// See [`RecurringDetector::detect`].
pub fn detect(
    account_id: i64,
    transactions: &[Transaction],
    lookback_days: u32,
    existing: &[RecurringPattern],
) -> Result<Vec<RecurringPattern>> {
    RecurringDetector::new(DetectorConfig::default())?.detect(
        account_id,
        transactions,
        lookback_days,
        existing,
    )
}
