pub mod classify;
pub mod config;
pub mod matcher;
pub mod normalize;
pub mod report;
pub mod store;

pub use classify::{classify, Classification, VerdictCounts};
pub use config::{
    CanonicalField, ColumnAliases, ConfigError, CurrencyPolicy, ReconcileConfig,
};
pub use matcher::{match_records, MatchResult, Verdict};
pub use normalize::{normalize, NormalizedFile, SkippedRow};
pub use report::{ChannelReport, Diagnostics, ReconciliationReport, Summary, Tally};
pub use store::RecordStore;

use tally_core::{RawTable, RecordKind};

pub const DEPOSIT_SOURCE: &str = "deposit_ledger";
pub const WITHDRAW_SOURCE: &str = "withdraw_ledger";

/// Runs one reconciliation batch: normalize every file, index the records,
/// match ledgers against channels, classify, and aggregate.
///
/// Only a malformed configuration aborts; every file- and row-level problem
/// surfaces through the report's flags and diagnostics instead.
pub fn reconcile(
    deposit: RawTable,
    withdraw: RawTable,
    channels: Vec<(String, RawTable)>,
    config: &ReconcileConfig,
) -> Result<ReconciliationReport, ConfigError> {
    config.validate()?;

    let deposit_file = normalize(&deposit, RecordKind::DepositLedger, DEPOSIT_SOURCE, config);
    let withdraw_file = normalize(&withdraw, RecordKind::WithdrawLedger, WITHDRAW_SOURCE, config);
    let channel_files: Vec<NormalizedFile> = channels
        .iter()
        .map(|(name, table)| normalize(table, RecordKind::Channel, name, config))
        .collect();

    let mut diagnostics = Diagnostics::default();
    let mut needs_adaptation = false;
    for file in std::iter::once(&deposit_file)
        .chain(std::iter::once(&withdraw_file))
        .chain(channel_files.iter())
    {
        if file.needs_adaptation {
            needs_adaptation = true;
            diagnostics.needs_adaptation_sources.push(file.source.clone());
        }
        diagnostics.skipped_rows.extend(file.skipped_rows.iter().cloned());
        if file.filtered_rows > 0 {
            diagnostics
                .filtered_rows
                .insert(file.source.clone(), file.filtered_rows as u64);
        }
    }

    let channel_names: Vec<String> = channels.iter().map(|(name, _)| name.clone()).collect();
    let store = RecordStore::build(
        (DEPOSIT_SOURCE.to_string(), deposit_file.records),
        (WITHDRAW_SOURCE.to_string(), withdraw_file.records),
        channel_files
            .into_iter()
            .map(|file| (file.source, file.records))
            .collect(),
    );

    let results = match_records(&store, config);
    let classification = classify(&results);
    Ok(report::aggregate(
        &results,
        &classification,
        &channel_names,
        diagnostics,
        needs_adaptation,
    ))
}
