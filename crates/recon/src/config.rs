use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The canonical fields a raw column can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalField {
    TransactionId,
    Amount,
    Currency,
    Timestamp,
    Status,
    Account,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::TransactionId,
        CanonicalField::Amount,
        CanonicalField::Currency,
        CanonicalField::Timestamp,
        CanonicalField::Status,
        CanonicalField::Account,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::TransactionId => "transaction_id",
            CanonicalField::Amount => "amount",
            CanonicalField::Currency => "currency",
            CanonicalField::Timestamp => "timestamp",
            CanonicalField::Status => "status",
            CanonicalField::Account => "account",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Accepted source-column headers per canonical field. Matching is
/// case-insensitive with whitespace and underscores collapsed, and the
/// canonical field name itself always counts as an alias.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub transaction_id: Vec<String>,
    pub amount: Vec<String>,
    pub currency: Vec<String>,
    pub timestamp: Vec<String>,
    pub status: Vec<String>,
    pub account: Vec<String>,
}

impl ColumnAliases {
    pub fn for_field(&self, field: CanonicalField) -> &[String] {
        match field {
            CanonicalField::TransactionId => &self.transaction_id,
            CanonicalField::Amount => &self.amount,
            CanonicalField::Currency => &self.currency,
            CanonicalField::Timestamp => &self.timestamp,
            CanonicalField::Status => &self.status,
            CanonicalField::Account => &self.account,
        }
    }

    pub fn for_field_mut(&mut self, field: CanonicalField) -> &mut Vec<String> {
        match field {
            CanonicalField::TransactionId => &mut self.transaction_id,
            CanonicalField::Amount => &mut self.amount,
            CanonicalField::Currency => &mut self.currency,
            CanonicalField::Timestamp => &mut self.timestamp,
            CanonicalField::Status => &mut self.status,
            CanonicalField::Account => &mut self.account,
        }
    }
}

impl Default for ColumnAliases {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            transaction_id: list(&[
                "transaction id",
                "order id",
                "order no",
                "order number",
                "merchant order no",
                "platform order no",
                "txn id",
                "reference",
                "订单编号",
                "商户订单号",
                "平台订单号",
            ]),
            amount: list(&[
                "amount",
                "actual amount",
                "txn amount",
                "gross amount",
                "value",
                "金额",
                "实际金额",
            ]),
            currency: list(&["currency", "currency code", "ccy", "币种"]),
            timestamp: list(&[
                "timestamp",
                "time",
                "date",
                "created at",
                "completed at",
                "transaction time",
                "交易时间",
            ]),
            status: list(&["status", "state", "transaction status", "状态"]),
            account: list(&["account", "account no", "account name", "payer account", "账户"]),
        }
    }
}

/// What to do when a ledger and channel record agree on amount but not on
/// currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrencyPolicy {
    /// A currency mismatch is an anomaly even when the amounts agree.
    #[default]
    Strict,
    /// Compare amounts only, ignoring the currency column.
    AmountOnly,
}

/// Process-wide reconciliation configuration. Loaded once, read-only for
/// the duration of a run; safe to share across concurrent runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Candidate timestamp formats, tried in order; first parse wins.
    pub timestamp_formats: Vec<String>,
    /// Matched records whose timestamps drift further apart than this are
    /// downgraded to a time-drift anomaly.
    pub time_tolerance_hours: i64,
    pub currency_policy: CurrencyPolicy,
    /// When non-empty, ledger rows whose status is not in this list are
    /// dropped before matching. Channel statements are never filtered.
    pub success_statuses: Vec<String>,
    /// Currency assumed when a file has no resolvable currency column.
    pub default_currency: String,
    pub aliases: ColumnAliases,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            timestamp_formats: vec![
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y/%m/%d %H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
                "%Y-%m-%d".to_string(),
                "%Y/%m/%d".to_string(),
                "%m/%d/%Y".to_string(),
            ],
            time_tolerance_hours: 24,
            currency_policy: CurrencyPolicy::default(),
            success_statuses: Vec::new(),
            default_currency: "USD".to_string(),
            aliases: ColumnAliases::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("canonical field '{0}' has no column aliases")]
    NoAliases(CanonicalField),
    #[error("timestamp format list is empty")]
    NoTimestampFormats,
    #[error("failed to parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ReconcileConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ReconcileConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Fatal-path check: a mapping no file could ever resolve against must
    /// abort the run before any file is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for field in CanonicalField::ALL {
            if self.aliases.for_field(field).is_empty() {
                return Err(ConfigError::NoAliases(field));
            }
        }
        if self.timestamp_formats.is_empty() {
            return Err(ConfigError::NoTimestampFormats);
        }
        Ok(())
    }
}
