//! Transaction window loaders and pattern persistence
//!
//! Rows with an unreadable date or amount still load (with the field
//! missing) so the detector can skip them with a reason. A row without a
//! usable `id` or `account_id` fails the load.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{RecurringPattern, Transaction};

/// Load transactions from a CSV file with a header row
///
/// Columns are matched by name (case-insensitive, any order); unknown
/// columns are ignored.
pub fn load_transactions_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = column_index(&headers);
    for required in ["id", "account_id"] {
        if !columns.contains_key(required) {
            return Err(Error::Import(format!("Missing required column: {}", required)));
        }
    }

    let mut transactions = Vec::new();
    for (row, result) in rdr.records().enumerate() {
        let record = result?;
        // header is line 1
        let line = row + 2;
        let field = |name: &str| column_value(&columns, &record, name);

        let id = parse_id(field("id"))
            .ok_or_else(|| Error::Import(format!("Line {}: invalid id '{}'", line, field("id"))))?;
        let account_id = parse_id(field("account_id")).ok_or_else(|| {
            Error::Import(format!(
                "Line {}: invalid account_id '{}'",
                line,
                field("account_id")
            ))
        })?;

        transactions.push(Transaction {
            id,
            account_id,
            date: parse_date(field("date")),
            amount: parse_amount(field("amount")),
            description: field("description").to_string(),
            reference: field("reference").to_string(),
            merchant_name: field("merchant_name").to_string(),
            payment_method: field("payment_method").to_string(),
            card_brand: field("card_brand").to_string(),
            partner_iban: field("partner_iban").to_string(),
            partner_name: field("partner_name").to_string(),
        });
    }

    debug!("Parsed {} CSV transactions", transactions.len());
    Ok(transactions)
}

fn column_value<'r>(
    columns: &HashMap<String, usize>,
    record: &'r StringRecord,
    name: &str,
) -> &'r str {
    columns
        .get(name)
        .and_then(|&i| record.get(i))
        .unwrap_or("")
}

fn column_index(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_lowercase(), i))
        .collect()
}

/// Loosely typed JSON row; ids and amounts may be numbers or strings
#[derive(Debug, Deserialize)]
struct RawTransaction {
    id: Option<Value>,
    account_id: Option<Value>,
    date: Option<Value>,
    amount: Option<Value>,
    description: Option<String>,
    reference: Option<String>,
    merchant_name: Option<String>,
    payment_method: Option<String>,
    card_brand: Option<String>,
    partner_iban: Option<String>,
    partner_name: Option<String>,
}

/// Load transactions from a JSON array
pub fn load_transactions_json<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let raw: Vec<RawTransaction> = serde_json::from_reader(reader)?;

    let transactions = raw
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let id = row.id.as_ref().and_then(value_to_id).ok_or_else(|| {
                Error::Import(format!("Entry {}: missing or invalid id", index))
            })?;
            let account_id = row.account_id.as_ref().and_then(value_to_id).ok_or_else(|| {
                Error::Import(format!("Entry {}: missing or invalid account_id", index))
            })?;
            Ok(Transaction {
                id,
                account_id,
                date: row.date.as_ref().and_then(Value::as_str).and_then(parse_date),
                amount: row.amount.as_ref().and_then(value_to_amount),
                description: row.description.unwrap_or_default(),
                reference: row.reference.unwrap_or_default(),
                merchant_name: row.merchant_name.unwrap_or_default(),
                payment_method: row.payment_method.unwrap_or_default(),
                card_brand: row.card_brand.unwrap_or_default(),
                partner_iban: row.partner_iban.unwrap_or_default(),
                partner_name: row.partner_name.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("Parsed {} JSON transactions", transactions.len());
    Ok(transactions)
}

/// Load a transaction file, choosing the format from the extension
/// (`.json` is JSON, anything else CSV)
pub fn load_transactions_file(path: &Path) -> Result<Vec<Transaction>> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Transaction file not found: {}",
            path.display()
        )));
    }
    let reader = BufReader::new(File::open(path)?);
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let transactions = if is_json {
        load_transactions_json(reader)?
    } else {
        load_transactions_csv(reader)?
    };
    info!(
        "Loaded {} transactions from {}",
        transactions.len(),
        path.display()
    );
    Ok(transactions)
}

/// Split a window into per-account lists, ordered by account id
pub fn partition_by_account(transactions: Vec<Transaction>) -> BTreeMap<i64, Vec<Transaction>> {
    let mut accounts: BTreeMap<i64, Vec<Transaction>> = BTreeMap::new();
    for tx in transactions {
        accounts.entry(tx.account_id).or_default().push(tx);
    }
    accounts
}

/// Load persisted patterns; a missing file means none yet
pub fn load_patterns(path: &Path) -> Result<Vec<RecurringPattern>> {
    if !path.exists() {
        debug!("No patterns file at {}", path.display());
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let patterns: Vec<RecurringPattern> = serde_json::from_reader(reader)?;
    debug!("Loaded {} patterns from {}", patterns.len(), path.display());
    Ok(patterns)
}

/// Write patterns as pretty JSON, replacing the file
pub fn save_patterns(path: &Path, patterns: &[RecurringPattern]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(patterns)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    info!("Saved {} patterns to {}", patterns.len(), path.display());
    Ok(())
}

fn parse_id(s: &str) -> Option<i64> {
    s.trim().parse::<i64>().ok()
}

fn value_to_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_id(s),
        _ => None,
    }
}

fn value_to_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Parse a date in one of the accepted formats
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%d.%m.%Y", // 15.01.2024
        "%m/%d/%Y", // 01/15/2024
    ];

    let parsed = formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok());
    if parsed.is_none() {
        debug!("Unable to parse date: {}", s);
    }
    parsed
}

/// Parse an amount, handling currency symbols, thousands separators and
/// parentheses for negatives
fn parse_amount(s: &str) -> Option<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let cleaned: String = trimmed
        .replace(['$', '€', '£', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    let parsed = Decimal::from_str(&cleaned).ok();
    if parsed.is_none() {
        debug!("Unable to parse amount: {}", s);
    }
    parsed
}
