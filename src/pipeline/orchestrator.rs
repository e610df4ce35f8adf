use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::pipeline::artifacts;
use crate::pipeline::ingestion::RawRecordReader;
use crate::pipeline::loader::{BulkLoader, LoadTotals};
use crate::pipeline::processing::{
    deduplicate, DedupeReport, LineTotalEnricher, NormalizeReport, RecordNormalizer,
};
use crate::pipeline::storage::DocumentCollection;
use crate::types::{DeduplicatedRecord, EnrichedRecord, RawRecord};

/// Rows and counts produced by the cleaning stage
#[derive(Debug)]
pub struct CleanOutput {
    pub rows: Vec<DeduplicatedRecord>,
    pub normalize: NormalizeReport,
    pub dedupe: DedupeReport,
}

/// Final counts of a run, handed to the scheduler and notifier
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub rows_read: usize,
    pub rows_after_dedupe: usize,
    pub descriptions_imputed: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// Body of the success notification
    pub fn notification_message(&self) -> String {
        format!(
            "The ETL pipeline for the Online Retail dataset has completed successfully. \
             {} new documents were added to the database ({} duplicates skipped).",
            self.inserted, self.duplicates
        )
    }
}

/// Normalize then deduplicate, in that order.
pub fn clean_records(raw: Vec<RawRecord>) -> Result<CleanOutput> {
    let (normalized, normalize) = RecordNormalizer::new().normalize(raw)?;
    let (rows, dedupe) = deduplicate(normalized);
    Ok(CleanOutput {
        rows,
        normalize,
        dedupe,
    })
}

pub fn transform_records(rows: Vec<DeduplicatedRecord>) -> Result<Vec<EnrichedRecord>> {
    LineTotalEnricher::new().enrich_all(rows)
}

/// Runs the stages in sequence, each consuming the previous stage's rows
pub struct PipelineOrchestrator {
    config: EtlConfig,
    collection: Option<Arc<dyn DocumentCollection>>,
}

impl PipelineOrchestrator {
    /// Orchestrator for the file stages only; `load` and `run` need a collection.
    pub fn new(config: EtlConfig) -> Self {
        Self {
            config,
            collection: None,
        }
    }

    pub fn with_collection(mut self, collection: Arc<dyn DocumentCollection>) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Raw file → cleaned artifact
    #[instrument(skip(self))]
    pub fn clean(&self) -> Result<CleanOutput> {
        let raw = RawRecordReader::from_path(self.config.raw_path())?.read_all()?;
        let output = clean_records(raw)?;
        artifacts::write_cleaned(self.config.cleaned_path(), &output.rows)?;
        info!("Data Cleaning completed successfully.");
        Ok(output)
    }

    /// Cleaned artifact → transformed artifact
    #[instrument(skip(self))]
    pub fn transform(&self) -> Result<Vec<EnrichedRecord>> {
        let cleaned = artifacts::read_cleaned(self.config.cleaned_path())?;
        let enriched = transform_records(cleaned)?;
        artifacts::write_transformed(self.config.transformed_path(), &enriched)?;
        info!("Total Price column added successfully.");
        Ok(enriched)
    }

    /// Transformed artifact → collection
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<LoadTotals> {
        let enriched = artifacts::read_transformed(self.config.transformed_path())?;
        self.load_records(enriched).await
    }

    pub async fn load_records(&self, enriched: Vec<EnrichedRecord>) -> Result<LoadTotals> {
        let collection = self.collection.as_ref().ok_or_else(|| {
            EtlError::Config("no target collection configured for loading".to_string())
        })?;
        let loader = BulkLoader::new(Arc::clone(collection), self.config.loader.clone());
        loader.load(enriched).await
    }

    /// Every stage in one process. Rows pass in memory; both artifacts are still written.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunSummary> {
        let raw = RawRecordReader::from_path(self.config.raw_path())?.read_all()?;
        self.run_records(raw, true).await
    }

    /// Run the stages over rows already in memory.
    pub async fn run_records(
        &self,
        raw: Vec<RawRecord>,
        write_artifacts: bool,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting pipeline run over {} rows", raw.len());

        let clean = clean_records(raw)?;
        if write_artifacts {
            artifacts::write_cleaned(self.config.cleaned_path(), &clean.rows)?;
        }

        let enriched = transform_records(clean.rows)?;
        if write_artifacts {
            artifacts::write_transformed(self.config.transformed_path(), &enriched)?;
        }

        let totals = self.load_records(enriched).await?;

        let summary = RunSummary {
            run_id,
            rows_read: clean.normalize.rows,
            rows_after_dedupe: clean.dedupe.kept,
            descriptions_imputed: clean.normalize.descriptions_imputed,
            inserted: totals.inserted,
            duplicates: totals.duplicates,
            finished_at: Utc::now(),
        };
        info!(
            %run_id,
            "Pipeline run finished in {:.2}s: {} inserted, {} duplicates",
            started.elapsed().as_secs_f64(),
            summary.inserted,
            summary.duplicates
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::InMemoryCollection;
    use rust_decimal::Decimal;

    fn raw(invoice_no: &str, stock_code: &str, description: Option<&str>) -> RawRecord {
        RawRecord {
            invoice_no: invoice_no.to_string(),
            stock_code: stock_code.to_string(),
            description: description.map(str::to_string),
            quantity: 2,
            invoice_timestamp: "2010-12-01 08:26:00".to_string(),
            unit_price: Decimal::new(165, 2),
            customer_id: None,
            country: "France".to_string(),
        }
    }

    #[test]
    fn test_clean_records_imputes_before_deduplicating() {
        // identical once the missing description is filled in
        let input = vec![
            raw("1", "A", Some("Widget")),
            raw("1", "A", None),
            raw("2", "A", Some("Widget")),
        ];
        let output = clean_records(input).unwrap();
        assert_eq!(output.normalize.descriptions_imputed, 1);
        assert_eq!(output.dedupe.dropped, 1);
        assert_eq!(output.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_run_records_reports_counts() {
        let collection = InMemoryCollection::new("retail_transactions");
        let orchestrator = PipelineOrchestrator::new(EtlConfig::default())
            .with_collection(Arc::new(collection.clone()));

        let input = vec![raw("1", "A", Some("Widget")), raw("2", "B", None)];
        let summary = orchestrator.run_records(input, false).await.unwrap();

        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.rows_after_dedupe, 2);
        assert_eq!(summary.inserted, 2);
        assert_eq!(summary.duplicates, 0);
        assert!(summary
            .notification_message()
            .contains("2 new documents were added to the database"));
        assert_eq!(collection.count_documents().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_total_price_overflow_stops_before_loading() {
        let collection = InMemoryCollection::new("retail_transactions");
        let orchestrator = PipelineOrchestrator::new(EtlConfig::default())
            .with_collection(Arc::new(collection.clone()));

        let mut huge = raw("2", "B", Some("Gadget"));
        huge.quantity = i64::MAX;
        huge.unit_price = Decimal::from(10_000_000_000_000_i64);
        let err = orchestrator
            .run_records(vec![raw("1", "A", Some("Widget")), huge], false)
            .await
            .unwrap_err();

        assert!(matches!(err, EtlError::MalformedInput { line: 3, .. }));
        assert!(!collection.has_unique_index());
        assert_eq!(collection.count_documents().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_without_collection_is_config_error() {
        let orchestrator = PipelineOrchestrator::new(EtlConfig::default());
        let err = orchestrator.load_records(Vec::new()).await.unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
