use metrics::histogram;
use std::collections::HashSet;
use tracing::{info, instrument};

use crate::types::{DeduplicatedRecord, NormalizedRecord};

/// Counts from one deduplication pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub input: usize,
    pub kept: usize,
    pub dropped: usize,
}

/// Drop rows that are field-wise identical to an earlier row.
///
/// First occurrence wins and survivors keep their relative order.
#[instrument(skip(records), fields(rows = records.len()))]
pub fn deduplicate(records: Vec<NormalizedRecord>) -> (Vec<DeduplicatedRecord>, DedupeReport) {
    let input = records.len();
    let first_seen: Vec<bool> = {
        let mut seen: HashSet<&NormalizedRecord> = HashSet::with_capacity(input);
        records.iter().map(|record| seen.insert(record)).collect()
    };
    let kept: Vec<DeduplicatedRecord> = records
        .into_iter()
        .zip(first_seen)
        .filter_map(|(record, first)| first.then_some(record))
        .collect();

    let report = DedupeReport {
        input,
        kept: kept.len(),
        dropped: input - kept.len(),
    };
    histogram!("retail_etl_stage_rows", "stage" => "dedupe").record(report.kept as f64);
    info!(
        "Deduplicated {} rows: kept {}, dropped {}",
        report.input, report.kept, report.dropped
    );
    (kept, report)
}
