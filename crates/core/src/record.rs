use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

/// One decoded tabular file: a header row plus loose string cells.
/// Produced by a file decoder, consumed once by the schema normalizer.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable { headers, rows }
    }

    /// A table standing in for an input file that was not supplied.
    pub fn empty() -> Self {
        RawTable::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Deposit,
    Withdraw,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Deposit => write!(f, "deposit"),
            Direction::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// Declared kind of an input file. Ledger kinds fix the direction of every
/// record in the file; channel statements carry no direction of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    DepositLedger,
    WithdrawLedger,
    Channel,
}

impl RecordKind {
    pub fn direction(self) -> Option<Direction> {
        match self {
            RecordKind::DepositLedger => Some(Direction::Deposit),
            RecordKind::WithdrawLedger => Some(Direction::Withdraw),
            RecordKind::Channel => None,
        }
    }

    pub fn is_ledger(self) -> bool {
        !matches!(self, RecordKind::Channel)
    }
}

/// A record in canonical form. `transaction_id` is non-empty and `amount`
/// is rounded to the minor-unit precision of `currency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub transaction_id: String,
    pub amount: Money,
    pub currency: String,
    pub timestamp: Option<NaiveDateTime>,
    pub direction: Option<Direction>,
    pub status: Option<String>,
    pub account: Option<String>,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_kind_direction() {
        assert_eq!(RecordKind::DepositLedger.direction(), Some(Direction::Deposit));
        assert_eq!(RecordKind::WithdrawLedger.direction(), Some(Direction::Withdraw));
        assert_eq!(RecordKind::Channel.direction(), None);
    }

    #[test]
    fn empty_table_has_no_columns() {
        let t = RawTable::empty();
        assert!(t.is_empty());
        assert_eq!(t.column_count(), 0);
    }

    #[test]
    fn direction_display() {
        assert_eq!(Direction::Deposit.to_string(), "deposit");
        assert_eq!(Direction::Withdraw.to_string(), "withdraw");
    }
}
