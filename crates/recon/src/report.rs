use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use tally_core::Direction;

use crate::classify::Classification;
use crate::matcher::{MatchResult, Verdict};
use crate::normalize::SkippedRow;

/// Counts and amounts for one ledger slice (overall, or one channel's share).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub count: u64,
    pub matched: u64,
    pub mismatched: u64,
    pub missing_in_channel: u64,
    pub amount: Decimal,
    pub matched_amount: Decimal,
    /// `matched / count`; absent rather than divide-by-zero when empty.
    pub match_ratio: Option<Decimal>,
}

impl Tally {
    fn add(&mut self, result: &MatchResult) {
        let Some(ledger) = &result.ledger else { return };
        self.count += 1;
        self.amount += ledger.amount.as_decimal();
        match result.verdict {
            Verdict::Matched => {
                self.matched += 1;
                self.matched_amount += ledger.amount.as_decimal();
            }
            Verdict::AmountMismatch | Verdict::TimeDrift => self.mismatched += 1,
            Verdict::MissingInChannel => self.missing_in_channel += 1,
            _ => {}
        }
    }

    fn finish(&mut self) {
        self.match_ratio = if self.count == 0 {
            None
        } else {
            Some((Decimal::from(self.matched) / Decimal::from(self.count)).round_dp(4))
        };
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub total_deposit: Tally,
    pub total_withdraw: Tally,
}

/// One channel's share of the run. Ledger records missing from every channel
/// cannot be attributed to any single one, so `missing_in_channel` stays in
/// the summary tallies only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChannelReport {
    pub deposit: Tally,
    pub withdraw: Tally,
    pub missing_in_ledger: u64,
    pub cross_channel_duplicates: u64,
    pub duplicate_keys: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub skipped_rows: Vec<SkippedRow>,
    pub duplicate_keys: BTreeMap<String, u64>,
    pub filtered_rows: BTreeMap<String, u64>,
    pub needs_adaptation_sources: Vec<String>,
}

/// The structured result of one reconciliation run. Field names and nesting
/// are a stable contract; immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub summary: Summary,
    pub channels: BTreeMap<String, ChannelReport>,
    pub mismatched: Vec<MatchResult>,
    pub missing_in_channel: Vec<MatchResult>,
    pub missing_in_ledger: Vec<MatchResult>,
    pub duplicates: Vec<MatchResult>,
    pub needs_adaptation: bool,
    pub diagnostics: Diagnostics,
}

/// Merges per-record verdicts into the final report. Builds fresh values
/// throughout; nothing here mutates shared state.
pub fn aggregate(
    results: &[MatchResult],
    classification: &Classification,
    channel_names: &[String],
    mut diagnostics: Diagnostics,
    needs_adaptation: bool,
) -> ReconciliationReport {
    let mut summary = Summary::default();
    let mut channels: BTreeMap<String, ChannelReport> = channel_names
        .iter()
        .map(|name| (name.clone(), ChannelReport::default()))
        .collect();

    for result in results {
        match &result.verdict {
            Verdict::Matched
            | Verdict::AmountMismatch
            | Verdict::TimeDrift
            | Verdict::MissingInChannel => {
                let Some(direction) = result.ledger.as_ref().and_then(|l| l.direction) else {
                    continue;
                };
                let total = match direction {
                    Direction::Deposit => &mut summary.total_deposit,
                    Direction::Withdraw => &mut summary.total_withdraw,
                };
                total.add(result);

                if let Some(channel_record) = &result.channel {
                    if let Some(channel) = channels.get_mut(&channel_record.source) {
                        match direction {
                            Direction::Deposit => channel.deposit.add(result),
                            Direction::Withdraw => channel.withdraw.add(result),
                        }
                    }
                }
            }
            Verdict::MissingInLedger => {
                if let Some(channel) = result
                    .channel
                    .as_ref()
                    .and_then(|c| channels.get_mut(&c.source))
                {
                    channel.missing_in_ledger += 1;
                }
            }
            Verdict::CrossChannelDuplicate { .. } => {
                if let Some(channel) = result
                    .channel
                    .as_ref()
                    .and_then(|c| channels.get_mut(&c.source))
                {
                    channel.cross_channel_duplicates += 1;
                }
            }
            Verdict::DuplicateKey => {
                *diagnostics
                    .duplicate_keys
                    .entry(result.source().to_string())
                    .or_default() += 1;
                if let Some(channel) = result
                    .channel
                    .as_ref()
                    .and_then(|c| channels.get_mut(&c.source))
                {
                    channel.duplicate_keys += 1;
                }
            }
        }
    }

    summary.total_deposit.finish();
    summary.total_withdraw.finish();
    for channel in channels.values_mut() {
        channel.deposit.finish();
        channel.withdraw.finish();
    }

    let select = |keep: fn(&Verdict) -> bool| -> Vec<MatchResult> {
        classification
            .anomalies
            .iter()
            .filter(|a| keep(&a.verdict))
            .cloned()
            .collect()
    };

    ReconciliationReport {
        summary,
        channels,
        mismatched: select(|v| matches!(v, Verdict::AmountMismatch | Verdict::TimeDrift)),
        missing_in_channel: select(|v| matches!(v, Verdict::MissingInChannel)),
        missing_in_ledger: select(|v| matches!(v, Verdict::MissingInLedger)),
        duplicates: select(|v| {
            matches!(v, Verdict::CrossChannelDuplicate { .. } | Verdict::DuplicateKey)
        }),
        needs_adaptation,
        diagnostics,
    }
}
