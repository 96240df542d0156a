//! Test utilities for recur-core
//!
//! Transaction builders and date helpers shared by the library tests and the
//! CLI tests (through the `test-utils` feature).

use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::models::Transaction;

/// Build a date, panicking on an invalid calendar day
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// Parse a decimal literal such as "-15.99"
pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).expect("valid test amount")
}

/// Fluent builder for test transactions
///
/// Defaults to account 1 with empty text fields.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    tx: Transaction,
}

impl TxBuilder {
    pub fn new(id: i64, date: NaiveDate, amount: &str) -> Self {
        Self {
            tx: Transaction {
                id,
                account_id: 1,
                date: Some(date),
                amount: Some(dec(amount)),
                ..Default::default()
            },
        }
    }

    pub fn account(mut self, account_id: i64) -> Self {
        self.tx.account_id = account_id;
        self
    }

    pub fn partner(mut self, iban: &str, name: &str) -> Self {
        self.tx.partner_iban = iban.to_string();
        self.tx.partner_name = name.to_string();
        self
    }

    pub fn payment_method(mut self, method: &str) -> Self {
        self.tx.payment_method = method.to_string();
        self
    }

    pub fn merchant(mut self, merchant: &str) -> Self {
        self.tx.merchant_name = merchant.to_string();
        self
    }

    pub fn card(mut self, method: &str, brand: &str) -> Self {
        self.tx.payment_method = method.to_string();
        self.tx.card_brand = brand.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.tx.description = description.to_string();
        self
    }

    pub fn reference(mut self, reference: &str) -> Self {
        self.tx.reference = reference.to_string();
        self
    }

    pub fn no_date(mut self) -> Self {
        self.tx.date = None;
        self
    }

    pub fn no_amount(mut self) -> Self {
        self.tx.amount = None;
        self
    }

    pub fn build(self) -> Transaction {
        self.tx
    }
}

/// A series of transactions spaced by the given day offsets
///
/// `offsets[i]` is the number of days after `start` of the i-th transaction;
/// `amounts[i]` is its amount (the last amount repeats when the list is
/// shorter). Ids count up from `first_id`. `configure` shapes each builder
/// (partner, merchant, description).
pub fn series(
    first_id: i64,
    start: NaiveDate,
    offsets: &[i64],
    amounts: &[&str],
    configure: impl Fn(TxBuilder) -> TxBuilder,
) -> Vec<Transaction> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, &offset)| {
            let amount = amounts
                .get(i)
                .or_else(|| amounts.last())
                .copied()
                .unwrap_or("0");
            let builder =
                TxBuilder::new(first_id + i as i64, start + Duration::days(offset), amount);
            configure(builder).build()
        })
        .collect()
}

/// Offsets for `count` occurrences every `interval` days
pub fn every(interval: i64, count: usize) -> Vec<i64> {
    (0..count as i64).map(|i| i * interval).collect()
}
