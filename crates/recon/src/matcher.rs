use chrono::Duration;
use serde::Serialize;

use tally_core::{currency, NormalizedRecord};

use crate::config::{CurrencyPolicy, ReconcileConfig};
use crate::store::{ChannelRef, RecordStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    Matched,
    AmountMismatch,
    /// Amounts agree but the timestamps drift outside the tolerance window.
    TimeDrift,
    MissingInChannel,
    MissingInLedger,
    /// The same id appears in more than one channel; the extra records are
    /// claimed by this verdict so they cannot be counted twice.
    CrossChannelDuplicate { primary_channel: String },
    DuplicateKey,
}

/// One ledger-or-channel record's reconciliation outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub transaction_id: String,
    pub verdict: Verdict,
    pub ledger: Option<NormalizedRecord>,
    pub channel: Option<NormalizedRecord>,
}

impl MatchResult {
    /// Source used for deterministic anomaly ordering: the ledger side when
    /// present, otherwise the channel side.
    pub fn source(&self) -> &str {
        self.ledger
            .as_ref()
            .map(|r| r.source.as_str())
            .or_else(|| self.channel.as_ref().map(|r| r.source.as_str()))
            .unwrap_or("")
    }

    pub fn is_anomaly(&self) -> bool {
        self.verdict != Verdict::Matched
    }
}

/// Runs the deterministic matching passes: deposit ledger in input order,
/// then withdraw ledger, then the leftover sweeps. Each ledger primary
/// record yields exactly one verdict, and each channel record is claimed by
/// at most one verdict.
pub fn match_records(store: &RecordStore, config: &ReconcileConfig) -> Vec<MatchResult> {
    let tolerance = Duration::hours(config.time_tolerance_hours);
    let mut consumed: Vec<Vec<bool>> = store
        .channels()
        .iter()
        .map(|c| vec![false; c.records().len()])
        .collect();
    let mut results = Vec::new();

    for ledger in [store.deposits(), store.withdrawals()] {
        for record in ledger.records() {
            let refs: Vec<ChannelRef> = store
                .channel_refs(&record.transaction_id)
                .iter()
                .copied()
                .filter(|r| !consumed[r.channel][r.record])
                .collect();

            let Some((&primary, extras)) = refs.split_first() else {
                results.push(MatchResult {
                    transaction_id: record.transaction_id.clone(),
                    verdict: Verdict::MissingInChannel,
                    ledger: Some(record.clone()),
                    channel: None,
                });
                continue;
            };

            consumed[primary.channel][primary.record] = true;
            let candidate = store.channel_record(primary);
            results.push(MatchResult {
                transaction_id: record.transaction_id.clone(),
                verdict: compare(record, candidate, config, tolerance),
                ledger: Some(record.clone()),
                channel: Some(candidate.clone()),
            });

            let primary_channel = store.channels()[primary.channel].name.clone();
            for &extra in extras {
                consumed[extra.channel][extra.record] = true;
                let duplicate = store.channel_record(extra);
                tracing::warn!(
                    id = record.transaction_id.as_str(),
                    primary = primary_channel.as_str(),
                    also = duplicate.source.as_str(),
                    "transaction id present in multiple channels"
                );
                results.push(MatchResult {
                    transaction_id: record.transaction_id.clone(),
                    verdict: Verdict::CrossChannelDuplicate {
                        primary_channel: primary_channel.clone(),
                    },
                    ledger: Some(record.clone()),
                    channel: Some(duplicate.clone()),
                });
            }
        }
    }

    // Channel records never claimed by a ledger pass.
    for (ci, channel) in store.channels().iter().enumerate() {
        for (ri, record) in channel.records().iter().enumerate() {
            if !consumed[ci][ri] {
                results.push(MatchResult {
                    transaction_id: record.transaction_id.clone(),
                    verdict: Verdict::MissingInLedger,
                    ledger: None,
                    channel: Some(record.clone()),
                });
            }
        }
    }

    // Within-source duplicate ids, from every source.
    for ledger in [store.deposits(), store.withdrawals()] {
        for record in ledger.duplicates() {
            results.push(MatchResult {
                transaction_id: record.transaction_id.clone(),
                verdict: Verdict::DuplicateKey,
                ledger: Some(record.clone()),
                channel: None,
            });
        }
    }
    for channel in store.channels() {
        for record in channel.duplicates() {
            results.push(MatchResult {
                transaction_id: record.transaction_id.clone(),
                verdict: Verdict::DuplicateKey,
                ledger: None,
                channel: Some(record.clone()),
            });
        }
    }

    results
}

fn compare(
    ledger: &NormalizedRecord,
    channel: &NormalizedRecord,
    config: &ReconcileConfig,
    tolerance: Duration,
) -> Verdict {
    if ledger.currency != channel.currency
        && config.currency_policy == CurrencyPolicy::Strict
    {
        return Verdict::AmountMismatch;
    }

    let exponent = currency::minor_unit_exponent(&ledger.currency);
    if ledger.amount.to_minor_units(exponent) != channel.amount.to_minor_units(exponent) {
        return Verdict::AmountMismatch;
    }

    if let (Some(lt), Some(ct)) = (ledger.timestamp, channel.timestamp) {
        let drift = if lt >= ct { lt - ct } else { ct - lt };
        if drift > tolerance {
            return Verdict::TimeDrift;
        }
    }

    Verdict::Matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::{Direction, Money};

    fn rec(id: &str, cents: i64, source: &str, direction: Option<Direction>) -> NormalizedRecord {
        NormalizedRecord {
            transaction_id: id.to_string(),
            amount: Money::from_minor_units(cents, 2),
            currency: "USD".to_string(),
            timestamp: None,
            direction,
            status: None,
            account: None,
            source: source.to_string(),
        }
    }

    fn dep(id: &str, cents: i64) -> NormalizedRecord {
        rec(id, cents, "deposit_ledger", Some(Direction::Deposit))
    }

    fn chan(id: &str, cents: i64, name: &str) -> NormalizedRecord {
        rec(id, cents, name, None)
    }

    fn at(record: NormalizedRecord, day: u32, hour: u32) -> NormalizedRecord {
        NormalizedRecord {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, day)
                .unwrap()
                .and_hms_opt(hour, 0, 0),
            ..record
        }
    }

    fn run(
        deposits: Vec<NormalizedRecord>,
        channels: Vec<(&str, Vec<NormalizedRecord>)>,
        config: &ReconcileConfig,
    ) -> Vec<MatchResult> {
        let store = RecordStore::build(
            ("deposit_ledger".to_string(), deposits),
            ("withdraw_ledger".to_string(), Vec::new()),
            channels
                .into_iter()
                .map(|(n, r)| (n.to_string(), r))
                .collect(),
        );
        match_records(&store, config)
    }

    #[test]
    fn equal_amount_and_currency_matches() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![dep("T1", 1000)],
            vec![("alpha", vec![chan("T1", 1000, "alpha")])],
            &config,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].verdict, Verdict::Matched);
    }

    #[test]
    fn amount_off_by_one_minor_unit_mismatches() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![dep("T1", 1000)],
            vec![("alpha", vec![chan("T1", 1001, "alpha")])],
            &config,
        );
        assert_eq!(results[0].verdict, Verdict::AmountMismatch);
        // Both values are recorded on the result.
        assert_eq!(results[0].ledger.as_ref().unwrap().amount.to_minor_units(2), 1000);
        assert_eq!(results[0].channel.as_ref().unwrap().amount.to_minor_units(2), 1001);
    }

    #[test]
    fn currency_mismatch_policy() {
        let mut channel_record = chan("T1", 1000, "alpha");
        channel_record.currency = "CNY".to_string();

        let strict = ReconcileConfig::default();
        let results = run(
            vec![dep("T1", 1000)],
            vec![("alpha", vec![channel_record.clone()])],
            &strict,
        );
        assert_eq!(results[0].verdict, Verdict::AmountMismatch);

        let mut lenient = ReconcileConfig::default();
        lenient.currency_policy = CurrencyPolicy::AmountOnly;
        let results = run(
            vec![dep("T1", 1000)],
            vec![("alpha", vec![channel_record])],
            &lenient,
        );
        assert_eq!(results[0].verdict, Verdict::Matched);
    }

    #[test]
    fn missing_in_channel_and_in_ledger() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![dep("T1", 1000)],
            vec![("alpha", vec![chan("T4", 500, "alpha")])],
            &config,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].verdict, Verdict::MissingInChannel);
        assert_eq!(results[1].verdict, Verdict::MissingInLedger);
        assert_eq!(results[1].transaction_id, "T4");
    }

    #[test]
    fn timestamps_within_tolerance_match() {
        let config = ReconcileConfig::default(); // 24h window
        let results = run(
            vec![at(dep("T1", 1000), 1, 10)],
            vec![("alpha", vec![at(chan("T1", 1000, "alpha"), 1, 20)])],
            &config,
        );
        assert_eq!(results[0].verdict, Verdict::Matched);
    }

    #[test]
    fn timestamps_outside_tolerance_drift() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![at(dep("T1", 1000), 1, 10)],
            vec![("alpha", vec![at(chan("T1", 1000, "alpha"), 3, 10)])],
            &config,
        );
        assert_eq!(results[0].verdict, Verdict::TimeDrift);
    }

    #[test]
    fn missing_timestamp_never_drifts() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![at(dep("T1", 1000), 1, 10)],
            vec![("alpha", vec![chan("T1", 1000, "alpha")])],
            &config,
        );
        assert_eq!(results[0].verdict, Verdict::Matched);
    }

    #[test]
    fn cross_channel_duplicate_claims_both_records() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![dep("T5", 1000)],
            vec![
                ("alpha", vec![chan("T5", 1000, "alpha")]),
                ("beta", vec![chan("T5", 1000, "beta")]),
            ],
            &config,
        );
        // One primary verdict plus one duplicate anomaly; no missing_in_ledger.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].verdict, Verdict::Matched);
        assert_eq!(results[0].channel.as_ref().unwrap().source, "alpha");
        assert_eq!(
            results[1].verdict,
            Verdict::CrossChannelDuplicate { primary_channel: "alpha".to_string() }
        );
        assert_eq!(results[1].channel.as_ref().unwrap().source, "beta");
    }

    #[test]
    fn deposits_claim_before_withdrawals() {
        let config = ReconcileConfig::default();
        let store = RecordStore::build(
            ("deposit_ledger".to_string(), vec![dep("T1", 1000)]),
            (
                "withdraw_ledger".to_string(),
                vec![rec("T1", 1000, "withdraw_ledger", Some(Direction::Withdraw))],
            ),
            vec![("alpha".to_string(), vec![chan("T1", 1000, "alpha")])],
        );
        let results = match_records(&store, &config);
        assert_eq!(results[0].verdict, Verdict::Matched);
        assert_eq!(
            results[0].ledger.as_ref().unwrap().direction,
            Some(Direction::Deposit)
        );
        assert_eq!(results[1].verdict, Verdict::MissingInChannel);
    }

    #[test]
    fn within_source_duplicates_emit_duplicate_key() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![dep("T1", 1000)],
            vec![("alpha", vec![chan("T1", 1000, "alpha"), chan("T1", 1000, "alpha")])],
            &config,
        );
        let dup: Vec<_> = results
            .iter()
            .filter(|r| r.verdict == Verdict::DuplicateKey)
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].channel.as_ref().unwrap().source, "alpha");
    }

    #[test]
    fn no_channel_record_is_claimed_twice() {
        let config = ReconcileConfig::default();
        let results = run(
            vec![dep("T1", 1000), dep("T2", 500)],
            vec![
                ("alpha", vec![chan("T1", 1000, "alpha"), chan("T2", 500, "alpha")]),
                ("beta", vec![chan("T1", 1000, "beta")]),
            ],
            &config,
        );
        let mut claimed = Vec::new();
        for result in &results {
            if let Some(channel) = &result.channel {
                let key = (channel.source.clone(), channel.transaction_id.clone());
                assert!(!claimed.contains(&key), "channel record claimed twice: {key:?}");
                claimed.push(key);
            }
        }
    }
}
