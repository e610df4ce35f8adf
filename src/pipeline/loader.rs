use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LoaderConfig;
use crate::error::{EtlError, Result};
use crate::pipeline::storage::{DocumentCollection, IndexSpec, WriteFailureKind};
use crate::types::{EnrichedRecord, StoredDocument};

/// Outcome of one committed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Row offset of the batch's first record in the submitted sequence
    pub batch_start: usize,
    pub size: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

/// Running totals over all batches of a load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadTotals {
    pub inserted: usize,
    pub duplicates: usize,
    pub batches: usize,
}

impl LoadTotals {
    fn absorb(&mut self, report: &BatchReport) {
        self.inserted += report.inserted;
        self.duplicates += report.duplicates;
        self.batches += 1;
    }
}

/// Writes enriched records into a uniquely-indexed collection in fixed-size batches.
///
/// Duplicate-key rejections are counted; any other rejection, a batch-level
/// storage error or a timeout aborts the load. Batches committed before the
/// abort stay committed.
pub struct BulkLoader {
    collection: Arc<dyn DocumentCollection>,
    settings: LoaderConfig,
}

impl BulkLoader {
    pub fn new(collection: Arc<dyn DocumentCollection>, settings: LoaderConfig) -> Self {
        Self {
            collection,
            settings,
        }
    }

    /// Create the full-record unique index if it does not exist yet.
    pub async fn ensure_index(&self) -> Result<()> {
        let spec = IndexSpec::full_record();
        self.collection
            .ensure_unique_index(&spec)
            .await
            .map_err(|e| match e {
                EtlError::IndexCreation(_) => e,
                other => EtlError::IndexCreation(other.to_string()),
            })?;
        info!(
            "Unique index {} ready on {}",
            spec.name,
            self.collection.name()
        );
        Ok(())
    }

    #[instrument(skip(self, records), fields(collection = %self.collection.name(), rows = records.len()))]
    pub async fn load(&self, records: Vec<EnrichedRecord>) -> Result<LoadTotals> {
        self.settings.validate()?;
        self.ensure_index().await?;

        let documents: Vec<StoredDocument> =
            records.into_iter().map(StoredDocument::from).collect();
        let batches = into_batches(documents, self.settings.chunk_size);
        info!(
            "Loading {} batches of up to {} documents with {} worker(s)",
            batches.len(),
            self.settings.chunk_size,
            self.settings.workers
        );

        let timeout = self.settings.batch_timeout();
        let mut pending = batches.into_iter();
        let mut in_flight: JoinSet<Result<BatchReport>> = JoinSet::new();
        let mut totals = LoadTotals::default();

        loop {
            while in_flight.len() < self.settings.workers {
                let Some((batch_start, batch)) = pending.next() else {
                    break;
                };
                let collection = Arc::clone(&self.collection);
                in_flight.spawn(submit_batch(collection, batch_start, batch, timeout));
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let report = joined
                .map_err(|e| EtlError::Storage(format!("batch task failed: {e}")))
                .and_then(|r| r);

            match report {
                Ok(report) => totals.absorb(&report),
                Err(e) => {
                    in_flight.abort_all();
                    error!(
                        "Load aborted after {} committed batches ({} inserted, {} duplicates): {}",
                        totals.batches, totals.inserted, totals.duplicates, e
                    );
                    return Err(e);
                }
            }
        }

        info!(
            "Data insertion completed, new documents inserted {}, duplicated documents {}",
            totals.inserted, totals.duplicates
        );
        Ok(totals)
    }
}

/// Split into owned batches tagged with their starting row.
fn into_batches(
    documents: Vec<StoredDocument>,
    chunk_size: usize,
) -> Vec<(usize, Vec<StoredDocument>)> {
    let mut batches = Vec::with_capacity(documents.len().div_ceil(chunk_size));
    let mut current = Vec::with_capacity(chunk_size.min(documents.len()));
    let mut start = 0;

    for (row, doc) in documents.into_iter().enumerate() {
        if current.is_empty() {
            start = row;
        }
        current.push(doc);
        if current.len() == chunk_size {
            batches.push((start, std::mem::take(&mut current)));
        }
    }
    if !current.is_empty() {
        batches.push((start, current));
    }
    batches
}

async fn submit_batch(
    collection: Arc<dyn DocumentCollection>,
    batch_start: usize,
    batch: Vec<StoredDocument>,
    timeout: Duration,
) -> Result<BatchReport> {
    let size = batch.len();
    let started = Instant::now();
    debug!("Submitting batch at row {} ({} documents)", batch_start, size);

    let outcome = match tokio::time::timeout(timeout, collection.insert_many_unordered(batch)).await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            return Err(EtlError::StorageFatal {
                batch_start,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(EtlError::BatchTimeout {
                batch_start,
                timeout_secs: timeout.as_secs(),
            })
        }
    };
    histogram!("retail_etl_batch_duration_seconds").record(started.elapsed().as_secs_f64());
    counter!("retail_etl_batches_total").increment(1);

    if let Some(failure) = outcome.first_non_duplicate() {
        let reason = match &failure.kind {
            WriteFailureKind::Other(msg) => msg.clone(),
            WriteFailureKind::DuplicateKey => "duplicate key".to_string(),
        };
        return Err(EtlError::StorageFatal {
            batch_start,
            reason: format!("document at row {} rejected: {}", batch_start + failure.index, reason),
        });
    }

    let duplicates = outcome.duplicates();
    counter!("retail_etl_documents_inserted_total").increment(outcome.inserted as u64);
    counter!("retail_etl_documents_duplicate_total").increment(duplicates as u64);

    if duplicates > 0 {
        warn!(
            "Duplicated documents in chunk starting at row {}: {}",
            batch_start, duplicates
        );
    }
    info!(
        "New documents inserted from chunk starting at row {}: {}",
        batch_start, outcome.inserted
    );

    Ok(BatchReport {
        batch_start,
        size,
        inserted: outcome.inserted,
        duplicates,
    })
}
