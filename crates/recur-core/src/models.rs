//! Data models for Recur

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A bank transaction as supplied by the transaction store
///
/// `date` and `amount` are optional so malformed rows can reach the detector
/// and be skipped with a recorded reason instead of failing the whole load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    /// Negative = expense, positive = income
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: String,
    /// Free-text reference / purpose line from the bank
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub merchant_name: String,
    /// Payment method (card, direct_debit, transfer, apple_pay, ...)
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub card_brand: String,
    /// Counterparty IBAN for transfers and direct debits
    #[serde(default)]
    pub partner_iban: String,
    #[serde(default)]
    pub partner_name: String,
}

/// Recurrence frequency of a detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    /// Every frequency hypothesis, most specific first
    pub const ALL: [Frequency; 5] = [
        Self::Weekly,
        Self::BiWeekly,
        Self::Monthly,
        Self::Quarterly,
        Self::Yearly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi-weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }

    /// Nominal interval between occurrences
    pub fn nominal_days(&self) -> u32 {
        match self {
            Self::Weekly => 7,
            Self::BiWeekly => 14,
            Self::Monthly => 30,
            Self::Quarterly => 90,
            Self::Yearly => 365,
        }
    }

    /// Tie-break priority (higher = more specific)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Weekly => 5,
            Self::BiWeekly => 4,
            Self::Monthly => 3,
            Self::Quarterly => 2,
            Self::Yearly => 1,
        }
    }

    /// Minimum number of occurrences before this frequency can be claimed
    pub fn min_occurrences(&self) -> usize {
        match self {
            Self::Weekly | Self::BiWeekly => 3,
            Self::Monthly | Self::Quarterly | Self::Yearly => 2,
        }
    }

    /// Normalized monthly cost of one occurrence of `amount`, None on overflow
    pub fn monthly_cost(&self, amount: Decimal) -> Option<Decimal> {
        let amount = amount.abs();
        let cost = match self {
            Self::Weekly => amount.checked_mul(Decimal::new(433, 2))?,
            Self::BiWeekly => amount.checked_mul(Decimal::new(217, 2))?,
            Self::Monthly => amount,
            Self::Quarterly => amount / Decimal::from(3),
            Self::Yearly => amount / Decimal::from(12),
        };
        Some(cost.round_dp(2))
    }

    /// Normalized yearly cost of one occurrence of `amount`, None on overflow
    pub fn yearly_cost(&self, amount: Decimal) -> Option<Decimal> {
        let per_year = match self {
            Self::Weekly => 52,
            Self::BiWeekly => 26,
            Self::Monthly => 12,
            Self::Quarterly => 4,
            Self::Yearly => 1,
        };
        amount
            .abs()
            .checked_mul(Decimal::from(per_year))
            .map(|cost| cost.round_dp(2))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "bi-weekly" | "biweekly" => Ok(Self::BiWeekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(format!("Unknown frequency: {}", s)),
        }
    }
}

/// Grouping pass that produced a candidate group, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingPass {
    /// Counterparty IBAN + name + payment method
    PartnerInfo,
    /// Merchant + payment method + card brand
    MerchantInfo,
    /// Fuzzy match on normalized description/reference text
    DescriptionFuzzy,
}

impl GroupingPass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PartnerInfo => "partner_info",
            Self::MerchantInfo => "merchant_info",
            Self::DescriptionFuzzy => "description_fuzzy",
        }
    }
}

impl fmt::Display for GroupingPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A detected recurring pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringPattern {
    /// Stable identity derived from account, pass and grouping key
    pub identity_key: String,
    pub account_id: i64,
    pub pass: GroupingPass,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    /// Typical signed amount per occurrence
    pub amount: Decimal,
    pub frequency: Frequency,
    pub days_interval: u32,
    /// Calibrated confidence (0-1) of the winning frequency
    pub confidence_score: f64,
    /// First occurrence within the window of the latest run
    pub first_occurrence_date: NaiveDate,
    pub last_occurrence_date: NaiveDate,
    pub next_expected_date: NaiveDate,
    /// Occurrences within the window of the latest run; `transaction_ids`
    /// also keeps earlier runs' ids, so it can hold more
    pub occurrence_count: usize,
    pub is_active: bool,
    /// User marked this as not relevant; survives re-detection
    #[serde(default)]
    pub is_ignored: bool,
    #[serde(default)]
    pub similar_descriptions: BTreeSet<String>,
    /// Every transaction linked to this pattern across runs
    #[serde(default)]
    pub transaction_ids: BTreeSet<i64>,
    #[serde(default)]
    pub user_notes: String,
}

impl RecurringPattern {
    /// Whether the next expected occurrence has passed without being seen
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        today > self.next_expected_date
    }

    /// Days until the next expected occurrence (negative when overdue)
    pub fn days_until_next(&self, today: NaiveDate) -> i64 {
        (self.next_expected_date - today).num_days()
    }

    pub fn monthly_cost(&self) -> Option<Decimal> {
        self.frequency.monthly_cost(self.amount)
    }

    pub fn yearly_cost(&self) -> Option<Decimal> {
        self.frequency.yearly_cost(self.amount)
    }

    /// Active and not ignored by the user
    pub fn is_tracked(&self) -> bool {
        self.is_active && !self.is_ignored
    }
}

/// Why a transaction was left out of grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingDate,
    MissingAmount,
    /// Same id seen earlier in the window
    DuplicateId,
    /// Belongs to a different account than the one being analyzed
    ForeignAccount,
    /// No partner, no merchant and no usable text for fuzzy matching
    Ungroupable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingDate => "missing_date",
            Self::MissingAmount => "missing_amount",
            Self::DuplicateId => "duplicate_id",
            Self::ForeignAccount => "foreign_account",
            Self::Ungroupable => "ungroupable",
        }
    }
}

/// A transaction excluded from detection, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTransaction {
    pub transaction_id: i64,
    pub reason: SkipReason,
}

/// Full output of one detection run
#[derive(Debug, Clone, Default, Serialize)]
pub struct DetectionReport {
    pub account_id: i64,
    /// Active and newly inactivated patterns
    pub patterns: Vec<RecurringPattern>,
    pub skipped: Vec<SkippedTransaction>,
    pub transactions_considered: usize,
    pub groups_formed: usize,
    pub groups_scored: usize,
    pub patterns_detected: usize,
    pub patterns_inactivated: usize,
}
