use crate::constants::{COL_QUANTITY, COL_UNIT_PRICE};
use crate::error::{EtlError, Result};
use crate::types::RawRecord;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// Row shape of the raw export, one field per source column
#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "StockCode")]
    stock_code: String,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: String,
    #[serde(rename = "InvoiceDate")]
    invoice_date: String,
    #[serde(rename = "UnitPrice")]
    unit_price: String,
    #[serde(rename = "CustomerID")]
    customer_id: Option<String>,
    #[serde(rename = "Country")]
    country: String,
}

/// Reads RawRecords from a delimited file in file order
pub struct RawRecordReader<R: Read> {
    reader: csv::Reader<R>,
}

impl RawRecordReader<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> RawRecordReader<R> {
    pub fn from_reader(rdr: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);
        Self { reader }
    }

    /// Read every row. Any unparsable numeric field aborts the read.
    #[instrument(skip(self))]
    pub fn read_all(mut self) -> Result<Vec<RawRecord>> {
        let headers = self.reader.headers()?.clone();
        let mut records = Vec::new();

        for result in self.reader.records() {
            let row = result?;
            let line = row
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(records.len() + 2);
            let raw: RawRow = row.deserialize(Some(&headers))?;
            records.push(into_raw_record(raw, line)?);

            if records.len() % 100_000 == 0 {
                debug!("Read {} raw rows", records.len());
            }
        }

        info!("Read {} raw rows", records.len());
        Ok(records)
    }
}

fn into_raw_record(row: RawRow, line: usize) -> Result<RawRecord> {
    let quantity = parse_quantity(&row.quantity).ok_or_else(|| EtlError::MalformedInput {
        line,
        field: COL_QUANTITY,
        value: row.quantity.clone(),
    })?;
    let unit_price = parse_decimal(&row.unit_price).ok_or_else(|| EtlError::MalformedInput {
        line,
        field: COL_UNIT_PRICE,
        value: row.unit_price.clone(),
    })?;

    Ok(RawRecord {
        invoice_no: row.invoice_no,
        stock_code: row.stock_code,
        description: non_blank(row.description),
        quantity,
        invoice_timestamp: row.invoice_date,
        unit_price,
        customer_id: non_blank(row.customer_id),
        country: row.country,
    })
}

/// Integer quantities, also accepting integral float renderings like `6.0`.
fn parse_quantity(s: &str) -> Option<i64> {
    if let Ok(q) = s.parse::<i64>() {
        return Some(q);
    }
    let d = parse_decimal(s)?;
    if d.fract().is_zero() {
        d.to_i64()
    } else {
        None
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
