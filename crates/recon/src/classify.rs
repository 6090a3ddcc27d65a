use serde::Serialize;

use crate::matcher::{MatchResult, Verdict};

/// Verdict totals over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerdictCounts {
    pub matched: u64,
    pub amount_mismatch: u64,
    pub time_drift: u64,
    pub missing_in_channel: u64,
    pub missing_in_ledger: u64,
    pub cross_channel_duplicate: u64,
    pub duplicate_key: u64,
}

#[derive(Debug, Clone)]
pub struct Classification {
    pub counts: VerdictCounts,
    /// Everything that is not a clean match, ordered by source then
    /// transaction id so re-runs produce identical output.
    pub anomalies: Vec<MatchResult>,
}

fn verdict_rank(verdict: &Verdict) -> u8 {
    match verdict {
        Verdict::Matched => 0,
        Verdict::AmountMismatch => 1,
        Verdict::TimeDrift => 2,
        Verdict::MissingInChannel => 3,
        Verdict::MissingInLedger => 4,
        Verdict::CrossChannelDuplicate { .. } => 5,
        Verdict::DuplicateKey => 6,
    }
}

/// Pure grouping of match results. No I/O, inputs untouched.
pub fn classify(results: &[MatchResult]) -> Classification {
    let mut counts = VerdictCounts::default();
    for result in results {
        match &result.verdict {
            Verdict::Matched => counts.matched += 1,
            Verdict::AmountMismatch => counts.amount_mismatch += 1,
            Verdict::TimeDrift => counts.time_drift += 1,
            Verdict::MissingInChannel => counts.missing_in_channel += 1,
            Verdict::MissingInLedger => counts.missing_in_ledger += 1,
            Verdict::CrossChannelDuplicate { .. } => counts.cross_channel_duplicate += 1,
            Verdict::DuplicateKey => counts.duplicate_key += 1,
        }
    }

    let mut anomalies: Vec<MatchResult> =
        results.iter().filter(|r| r.is_anomaly()).cloned().collect();
    anomalies.sort_by(|a, b| {
        a.source()
            .cmp(b.source())
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
            .then_with(|| verdict_rank(&a.verdict).cmp(&verdict_rank(&b.verdict)))
    });

    Classification { counts, anomalies }
}
