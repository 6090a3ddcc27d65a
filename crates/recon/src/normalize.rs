use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use tally_core::{currency, Money, NormalizedRecord, RawTable, RecordKind};

use crate::config::{CanonicalField, ReconcileConfig};

/// A row excluded at the parsing boundary, kept for the report diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub source: String,
    /// Zero-based data-row index (header row not counted).
    pub row: usize,
    pub column: String,
    pub value: String,
}

/// Outcome of normalizing one file. A file whose required columns cannot be
/// resolved contributes zero records and flags `needs_adaptation`; it never
/// aborts the run.
#[derive(Debug, Clone)]
pub struct NormalizedFile {
    pub source: String,
    pub records: Vec<NormalizedRecord>,
    pub needs_adaptation: bool,
    pub skipped_rows: Vec<SkippedRow>,
    /// Ledger rows dropped by the success-status filter.
    pub filtered_rows: usize,
}

impl NormalizedFile {
    fn unresolved(source: &str) -> Self {
        NormalizedFile {
            source: source.to_string(),
            records: Vec::new(),
            needs_adaptation: true,
            skipped_rows: Vec::new(),
            filtered_rows: 0,
        }
    }
}

struct ResolvedColumns {
    transaction_id: Option<usize>,
    amount: Option<usize>,
    currency: Option<usize>,
    timestamp: Option<usize>,
    status: Option<usize>,
    account: Option<usize>,
}

/// Canonical form of a header or alias: trimmed, lowercased, underscores and
/// runs of whitespace collapsed to single spaces.
pub(crate) fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_field(
    normalized_headers: &[String],
    field: CanonicalField,
    config: &ReconcileConfig,
) -> Option<usize> {
    let mut candidates: Vec<String> = config
        .aliases
        .for_field(field)
        .iter()
        .map(|a| normalize_header(a))
        .collect();
    // The canonical name is always accepted, so normalizing an
    // already-canonical table is a no-op.
    candidates.push(normalize_header(field.name()));

    let mut matches = normalized_headers
        .iter()
        .enumerate()
        .filter(|(_, header)| candidates.contains(*header))
        .map(|(i, _)| i);

    match (matches.next(), matches.next()) {
        (Some(index), None) => Some(index),
        // Zero matches, or an ambiguous header set: unresolved either way.
        _ => None,
    }
}

fn resolve_columns(headers: &[String], config: &ReconcileConfig) -> ResolvedColumns {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    ResolvedColumns {
        transaction_id: resolve_field(&normalized, CanonicalField::TransactionId, config),
        amount: resolve_field(&normalized, CanonicalField::Amount, config),
        currency: resolve_field(&normalized, CanonicalField::Currency, config),
        timestamp: resolve_field(&normalized, CanonicalField::Timestamp, config),
        status: resolve_field(&normalized, CanonicalField::Status, config),
        account: resolve_field(&normalized, CanonicalField::Account, config),
    }
}

/// Maps one raw table to canonical records. Soft failures (unresolvable
/// required columns, malformed cells) surface through the returned value.
pub fn normalize(
    table: &RawTable,
    kind: RecordKind,
    source: &str,
    config: &ReconcileConfig,
) -> NormalizedFile {
    // An absent input (no header row at all) is not a schema failure.
    if table.headers.is_empty() {
        return NormalizedFile {
            source: source.to_string(),
            records: Vec::new(),
            needs_adaptation: false,
            skipped_rows: Vec::new(),
            filtered_rows: 0,
        };
    }

    let columns = resolve_columns(&table.headers, config);
    let (Some(id_column), Some(amount_column)) = (columns.transaction_id, columns.amount) else {
        tracing::warn!(source, "required columns unresolved, file needs adaptation");
        return NormalizedFile::unresolved(source);
    };

    let mut records = Vec::with_capacity(table.rows.len());
    let mut skipped_rows = Vec::new();
    let mut filtered_rows = 0usize;

    for (row_index, row) in table.rows.iter().enumerate() {
        let cell = |column: usize| row.get(column).map(|s| s.trim()).unwrap_or("");

        let transaction_id = cell(id_column);
        if transaction_id.is_empty() {
            skipped_rows.push(SkippedRow {
                source: source.to_string(),
                row: row_index,
                column: table.headers[id_column].clone(),
                value: String::new(),
            });
            continue;
        }

        let status = columns
            .status
            .map(|c| cell(c).to_string())
            .filter(|s| !s.is_empty());

        if kind.is_ledger() && !config.success_statuses.is_empty() {
            if let Some(status) = status.as_deref() {
                let ok = config
                    .success_statuses
                    .iter()
                    .any(|s| s.trim().to_lowercase() == status.to_lowercase());
                if !ok {
                    filtered_rows += 1;
                    continue;
                }
            }
        }

        let currency_code = columns
            .currency
            .map(|c| cell(c))
            .filter(|s| !s.is_empty())
            .unwrap_or(&config.default_currency)
            .trim()
            .to_uppercase();
        let exponent = currency::minor_unit_exponent(&currency_code);

        let raw_amount = cell(amount_column);
        let amount = match parse_amount(raw_amount) {
            Some(value) => Money::from_decimal(value, exponent),
            None => {
                tracing::debug!(source, row = row_index, value = raw_amount, "unparsable amount");
                skipped_rows.push(SkippedRow {
                    source: source.to_string(),
                    row: row_index,
                    column: table.headers[amount_column].clone(),
                    value: raw_amount.to_string(),
                });
                continue;
            }
        };

        let timestamp = columns
            .timestamp
            .and_then(|c| parse_timestamp(cell(c), &config.timestamp_formats));

        let account = columns
            .account
            .map(|c| cell(c).to_string())
            .filter(|s| !s.is_empty());

        records.push(NormalizedRecord {
            transaction_id: transaction_id.to_string(),
            amount,
            currency: currency_code,
            timestamp,
            direction: kind.direction(),
            status,
            account,
            source: source.to_string(),
        });
    }

    NormalizedFile {
        source: source.to_string(),
        records,
        needs_adaptation: false,
        skipped_rows,
        filtered_rows,
    }
}

/// Parses an amount cell the way statements actually write them: currency
/// symbols or codes around the number, thousands separators, accounting
/// parentheses for negatives, and decimal commas without a dot.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.trim_matches(|c: char| c.is_alphabetic() || c.is_whitespace());
    let s = s.replace(['$', '¥', '€', '£', ' '], "");

    let s = if s.contains(',') && !s.contains('.') {
        let tail_len = s.rsplit(',').next().map(str::len).unwrap_or(0);
        if s.matches(',').count() == 1 && (1..=2).contains(&tail_len) {
            s.replace(',', ".")
        } else {
            s.replace(',', "")
        }
    } else {
        s.replace(',', "")
    };

    if s.is_empty() {
        return None;
    }
    let mut value = Decimal::from_str(&s).ok()?;
    if negative {
        value = -value;
    }
    Some(value)
}

fn parse_timestamp(raw: &str, formats: &[String]) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for format in formats {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(s, format) {
            return Some(datetime);
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            if let Some(datetime) = date.and_hms_opt(0, 0, 0) {
                return Some(datetime);
            }
        }
    }
    None
}
