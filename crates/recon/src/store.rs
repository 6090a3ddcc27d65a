use std::collections::HashMap;

use tally_core::NormalizedRecord;

/// Location of a primary channel record: (channel position, record position).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRef {
    pub channel: usize,
    pub record: usize,
}

/// Records of one source, keyed by transaction id. The first record with a
/// given id is primary; later ones land in the duplicate bucket and are
/// excluded from matching.
#[derive(Debug, Default)]
pub struct SourceRecords {
    pub name: String,
    records: Vec<NormalizedRecord>,
    index: HashMap<String, usize>,
    duplicates: Vec<NormalizedRecord>,
}

impl SourceRecords {
    fn new(name: String, input: Vec<NormalizedRecord>) -> Self {
        let mut records = Vec::with_capacity(input.len());
        let mut index = HashMap::with_capacity(input.len());
        let mut duplicates = Vec::new();
        for record in input {
            if index.contains_key(&record.transaction_id) {
                tracing::warn!(
                    source = name.as_str(),
                    id = record.transaction_id.as_str(),
                    "duplicate transaction id within source"
                );
                duplicates.push(record);
            } else {
                index.insert(record.transaction_id.clone(), records.len());
                records.push(record);
            }
        }
        SourceRecords { name, records, index, duplicates }
    }

    pub fn records(&self) -> &[NormalizedRecord] {
        &self.records
    }

    pub fn duplicates(&self) -> &[NormalizedRecord] {
        &self.duplicates
    }

    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    pub fn get(&self, transaction_id: &str) -> Option<&NormalizedRecord> {
        self.index.get(transaction_id).map(|&i| &self.records[i])
    }
}

/// In-memory index over one run's normalized records: the two ledgers plus
/// the channel statements in declaration order.
#[derive(Debug, Default)]
pub struct RecordStore {
    deposits: SourceRecords,
    withdrawals: SourceRecords,
    channels: Vec<SourceRecords>,
    channel_index: HashMap<String, Vec<ChannelRef>>,
}

impl RecordStore {
    pub fn build(
        deposits: (String, Vec<NormalizedRecord>),
        withdrawals: (String, Vec<NormalizedRecord>),
        channels: Vec<(String, Vec<NormalizedRecord>)>,
    ) -> Self {
        let deposits = SourceRecords::new(deposits.0, deposits.1);
        let withdrawals = SourceRecords::new(withdrawals.0, withdrawals.1);
        let channels: Vec<SourceRecords> = channels
            .into_iter()
            .map(|(name, records)| SourceRecords::new(name, records))
            .collect();

        let mut channel_index: HashMap<String, Vec<ChannelRef>> = HashMap::new();
        for (channel, source) in channels.iter().enumerate() {
            for (record, rec) in source.records().iter().enumerate() {
                channel_index
                    .entry(rec.transaction_id.clone())
                    .or_default()
                    .push(ChannelRef { channel, record });
            }
        }

        RecordStore { deposits, withdrawals, channels, channel_index }
    }

    pub fn deposits(&self) -> &SourceRecords {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &SourceRecords {
        &self.withdrawals
    }

    pub fn channels(&self) -> &[SourceRecords] {
        &self.channels
    }

    /// All primary channel records carrying this id, in channel declaration
    /// order.
    pub fn channel_refs(&self, transaction_id: &str) -> &[ChannelRef] {
        self.channel_index
            .get(transaction_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn channel_record(&self, r: ChannelRef) -> &NormalizedRecord {
        &self.channels[r.channel].records()[r.record]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Money, RecordKind};

    fn rec(id: &str, cents: i64, source: &str) -> NormalizedRecord {
        NormalizedRecord {
            transaction_id: id.to_string(),
            amount: Money::from_minor_units(cents, 2),
            currency: "USD".to_string(),
            timestamp: None,
            direction: RecordKind::Channel.direction(),
            status: None,
            account: None,
            source: source.to_string(),
        }
    }

    fn store_with_channels(channels: Vec<(&str, Vec<NormalizedRecord>)>) -> RecordStore {
        RecordStore::build(
            ("deposit_ledger".to_string(), Vec::new()),
            ("withdraw_ledger".to_string(), Vec::new()),
            channels
                .into_iter()
                .map(|(n, r)| (n.to_string(), r))
                .collect(),
        )
    }

    #[test]
    fn first_record_wins_later_duplicates_bucketed() {
        let store = store_with_channels(vec![(
            "alpha",
            vec![rec("T1", 100, "alpha"), rec("T1", 999, "alpha"), rec("T2", 50, "alpha")],
        )]);
        let alpha = &store.channels()[0];
        assert_eq!(alpha.records().len(), 2);
        assert_eq!(alpha.duplicate_count(), 1);
        assert_eq!(alpha.get("T1").unwrap().amount.to_minor_units(2), 100);
        assert_eq!(alpha.duplicates()[0].amount.to_minor_units(2), 999);
    }

    #[test]
    fn channel_refs_follow_declaration_order() {
        let store = store_with_channels(vec![
            ("beta", vec![rec("T5", 100, "beta")]),
            ("alpha", vec![rec("T5", 100, "alpha")]),
        ]);
        let refs = store.channel_refs("T5");
        assert_eq!(refs.len(), 2);
        assert_eq!(store.channel_record(refs[0]).source, "beta");
        assert_eq!(store.channel_record(refs[1]).source, "alpha");
    }

    #[test]
    fn unknown_id_yields_empty_refs() {
        let store = store_with_channels(vec![("alpha", vec![rec("T1", 100, "alpha")])]);
        assert!(store.channel_refs("T9").is_empty());
    }

    #[test]
    fn duplicates_are_excluded_from_the_index() {
        let store = store_with_channels(vec![(
            "alpha",
            vec![rec("T1", 100, "alpha"), rec("T1", 999, "alpha")],
        )]);
        assert_eq!(store.channel_refs("T1").len(), 1);
    }
}
