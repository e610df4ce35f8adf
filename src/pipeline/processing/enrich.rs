use metrics::histogram;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::constants::COL_TOTAL_PRICE;
use crate::error::{EtlError, Result};
use crate::types::{DeduplicatedRecord, EnrichedRecord};

/// Trait for computing derived fields on deduplicated records
pub trait Enricher {
    /// `line` is the record's line in the cleaned artifact, reported on failure.
    fn enrich(&self, record: DeduplicatedRecord, line: usize) -> Result<EnrichedRecord>;
}

/// Adds TotalAmount = Quantity × UnitPrice
#[derive(Debug, Default)]
pub struct LineTotalEnricher;

impl LineTotalEnricher {
    pub fn new() -> Self {
        Self
    }

    /// Enrich every record; nothing is dropped and negative quantities stay negative.
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn enrich_all(&self, records: Vec<DeduplicatedRecord>) -> Result<Vec<EnrichedRecord>> {
        let enriched = records
            .into_iter()
            .enumerate()
            // header occupies line 1
            .map(|(idx, r)| self.enrich(r, idx + 2))
            .collect::<Result<Vec<_>>>()?;
        histogram!("retail_etl_stage_rows", "stage" => "enrich").record(enriched.len() as f64);
        info!("Added TotalPrice to {} rows", enriched.len());
        Ok(enriched)
    }
}

impl Enricher for LineTotalEnricher {
    fn enrich(&self, record: DeduplicatedRecord, line: usize) -> Result<EnrichedRecord> {
        // Decimal multiplication keeps the combined scale of both operands
        let total_amount = Decimal::from(record.quantity)
            .checked_mul(record.unit_price)
            .ok_or_else(|| EtlError::MalformedInput {
                line,
                field: COL_TOTAL_PRICE,
                value: format!("{} x {}", record.quantity, record.unit_price),
            })?;
        Ok(EnrichedRecord {
            record,
            total_amount,
        })
    }
}
