use chrono::{DateTime, NaiveDate, NaiveDateTime};
use metrics::histogram;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

use crate::constants::{COL_INVOICE_DATE, MISSING_CUSTOMER_ID};
use crate::error::{EtlError, Result};
use crate::types::{NormalizedRecord, RawRecord};

/// Timestamp layouts accepted for InvoiceDate, tried in order
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Immutable StockCode → most frequent Description lookup, built in a full
/// pass over the dataset before any row is normalized.
#[derive(Debug, Clone, Default)]
pub struct DescriptionModes {
    modes: HashMap<String, String>,
}

impl DescriptionModes {
    /// Count non-missing descriptions per stock code and keep the mode.
    /// Ties go to the lexicographically smallest description.
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut counts: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
        for record in records {
            if let Some(description) = present_description(record.description.as_deref()) {
                *counts
                    .entry(record.stock_code.as_str())
                    .or_default()
                    .entry(description)
                    .or_default() += 1;
            }
        }

        let modes = counts
            .into_iter()
            .filter_map(|(code, freq)| {
                freq.into_iter()
                    .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then_with(|| db.cmp(da)))
                    .map(|(description, _)| (code.to_string(), description.to_string()))
            })
            .collect();

        Self { modes }
    }

    pub fn get(&self, stock_code: &str) -> Option<&str> {
        self.modes.get(stock_code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

/// Counts from one normalization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows: usize,
    pub descriptions_imputed: usize,
    pub descriptions_missing: usize,
    pub customer_ids_defaulted: usize,
}

/// Imputes missing descriptions and coerces column types
#[derive(Debug, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize the full ordered dataset. Output has the input's length and order.
    ///
    /// An unparsable InvoiceDate aborts the whole pass.
    #[instrument(skip(self, records), fields(rows = records.len()))]
    pub fn normalize(
        &self,
        records: Vec<RawRecord>,
    ) -> Result<(Vec<NormalizedRecord>, NormalizeReport)> {
        let started = std::time::Instant::now();
        let modes = DescriptionModes::from_records(&records);
        debug!("Built description modes for {} stock codes", modes.len());

        let mut report = NormalizeReport {
            rows: records.len(),
            ..Default::default()
        };
        let mut normalized = Vec::with_capacity(records.len());

        for (idx, raw) in records.into_iter().enumerate() {
            normalized.push(normalize_one(raw, idx, &modes, &mut report)?);
        }

        histogram!("retail_etl_stage_rows", "stage" => "normalize").record(report.rows as f64);
        info!(
            "Normalized {} rows in {:.2}s ({} descriptions imputed, {} still missing, {} customer ids defaulted)",
            report.rows,
            started.elapsed().as_secs_f64(),
            report.descriptions_imputed,
            report.descriptions_missing,
            report.customer_ids_defaulted
        );
        Ok((normalized, report))
    }
}

fn normalize_one(
    raw: RawRecord,
    idx: usize,
    modes: &DescriptionModes,
    report: &mut NormalizeReport,
) -> Result<NormalizedRecord> {
    let invoice_timestamp =
        parse_invoice_timestamp(&raw.invoice_timestamp).ok_or_else(|| EtlError::MalformedInput {
            // header occupies line 1
            line: idx + 2,
            field: COL_INVOICE_DATE,
            value: raw.invoice_timestamp.clone(),
        })?;

    let description = if present_description(raw.description.as_deref()).is_some() {
        raw.description
    } else {
        let imputed = modes.get(&raw.stock_code).map(str::to_string);
        if imputed.is_some() {
            report.descriptions_imputed += 1;
        } else {
            report.descriptions_missing += 1;
        }
        imputed
    };

    let customer_id = match raw.customer_id {
        Some(id) => id.trim().to_string(),
        None => {
            report.customer_ids_defaulted += 1;
            MISSING_CUSTOMER_ID.to_string()
        }
    };

    Ok(NormalizedRecord {
        invoice_no: raw.invoice_no,
        stock_code: raw.stock_code,
        description,
        quantity: raw.quantity,
        invoice_timestamp,
        unit_price: raw.unit_price,
        customer_id,
        country: raw.country,
    })
}

/// Whitespace-only descriptions count as missing.
fn present_description(description: Option<&str>) -> Option<&str> {
    description.filter(|d| !d.trim().is_empty())
}

/// Parse an InvoiceDate into a naive wall-clock time.
///
/// RFC 3339 input carrying an offset is converted to UTC.
pub fn parse_invoice_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn raw(stock_code: &str, description: Option<&str>) -> RawRecord {
        RawRecord {
            invoice_no: "536365".to_string(),
            stock_code: stock_code.to_string(),
            description: description.map(str::to_string),
            quantity: 1,
            invoice_timestamp: "12/1/2010 8:26".to_string(),
            unit_price: Decimal::new(255, 2),
            customer_id: Some("17850".to_string()),
            country: "United Kingdom".to_string(),
        }
    }

    #[test]
    fn test_imputes_mode_description() {
        let input = vec![
            raw("A", None),
            raw("A", Some("Widget")),
            raw("A", Some("Widget")),
            raw("A", Some("Gadget")),
        ];
        let (rows, report) = RecordNormalizer::new().normalize(input).unwrap();

        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].description.as_deref(), Some("Widget"));
        assert_eq!(rows[3].description.as_deref(), Some("Gadget"));
        assert_eq!(report.descriptions_imputed, 1);
    }

    #[test]
    fn test_leaves_description_missing_without_mode() {
        let input = vec![raw("B", None), raw("B", None), raw("A", Some("Widget"))];
        let (rows, report) = RecordNormalizer::new().normalize(input).unwrap();

        assert_eq!(rows[0].description, None);
        assert_eq!(rows[1].description, None);
        assert_eq!(report.descriptions_missing, 2);
        assert_eq!(report.descriptions_imputed, 0);
    }

    #[test]
    fn test_blank_descriptions_are_missing() {
        let input = vec![
            raw("A", Some("   ")),
            raw("A", Some("   ")),
            raw("A", Some("Widget")),
            raw("B", Some("\t")),
        ];
        let (rows, report) = RecordNormalizer::new().normalize(input).unwrap();

        assert_eq!(rows[0].description.as_deref(), Some("Widget"));
        assert_eq!(rows[1].description.as_deref(), Some("Widget"));
        assert_eq!(rows[3].description, None);
        assert_eq!(report.descriptions_imputed, 2);
        assert_eq!(report.descriptions_missing, 1);
    }

    #[test]
    fn test_mode_tie_break_is_stable() {
        let records = vec![
            raw("C", Some("Zebra")),
            raw("C", Some("Apple")),
            raw("C", None),
        ];
        for _ in 0..10 {
            let modes = DescriptionModes::from_records(&records);
            assert_eq!(modes.get("C"), Some("Apple"));
        }
    }

    #[test]
    fn test_mode_uses_whole_dataset() {
        // the missing row comes before any row that could fill it
        let input = vec![raw("D", None), raw("E", Some("Other")), raw("D", Some("Late"))];
        let (rows, _) = RecordNormalizer::new().normalize(input).unwrap();
        assert_eq!(rows[0].description.as_deref(), Some("Late"));
    }

    #[test]
    fn test_missing_customer_id_gets_sentinel() {
        let mut record = raw("A", Some("Widget"));
        record.customer_id = None;
        let (rows, report) = RecordNormalizer::new().normalize(vec![record]).unwrap();
        assert_eq!(rows[0].customer_id, MISSING_CUSTOMER_ID);
        assert_eq!(report.customer_ids_defaulted, 1);
    }

    #[test]
    fn test_unparsable_timestamp_is_malformed_input() {
        let mut record = raw("A", Some("Widget"));
        record.invoice_timestamp = "yesterday".to_string();
        let err = RecordNormalizer::new()
            .normalize(vec![raw("A", Some("Widget")), record])
            .unwrap_err();

        match err {
            EtlError::MalformedInput { line, field, .. } => {
                assert_eq!(line, 3);
                assert_eq!(field, COL_INVOICE_DATE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_invoice_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2010, 12, 1)
            .unwrap()
            .and_hms_opt(8, 26, 0)
            .unwrap();
        for input in [
            "12/1/2010 8:26",
            "2010-12-01 08:26:00",
            "2010-12-01T08:26:00",
            "2010-12-01 08:26",
            "2010-12-01T08:26:00Z",
            "2010-12-01T09:26:00+01:00",
        ] {
            assert_eq!(parse_invoice_timestamp(input), Some(expected), "{input}");
        }
        assert_eq!(parse_invoice_timestamp("not a date"), None);
    }
}
