//! Delimited hand-off files between stages.
//!
//! `clean` writes the normalized, deduplicated rows; `transform` reads them and
//! writes the same columns plus `TotalPrice`; `load` reads that file back.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::types::{EnrichedRecord, NormalizedRecord};

#[derive(Debug, Serialize, Deserialize)]
struct CleanedRow {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "StockCode")]
    stock_code: String,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: i64,
    #[serde(rename = "InvoiceDate")]
    invoice_date: NaiveDateTime,
    #[serde(rename = "UnitPrice", with = "rust_decimal::serde::str")]
    unit_price: Decimal,
    #[serde(rename = "CustomerID")]
    customer_id: String,
    #[serde(rename = "Country")]
    country: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransformedRow {
    #[serde(rename = "InvoiceNo")]
    invoice_no: String,
    #[serde(rename = "StockCode")]
    stock_code: String,
    #[serde(rename = "Description")]
    description: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: i64,
    #[serde(rename = "InvoiceDate")]
    invoice_date: NaiveDateTime,
    #[serde(rename = "UnitPrice", with = "rust_decimal::serde::str")]
    unit_price: Decimal,
    #[serde(rename = "CustomerID")]
    customer_id: String,
    #[serde(rename = "Country")]
    country: String,
    #[serde(rename = "TotalPrice", with = "rust_decimal::serde::str")]
    total_price: Decimal,
}

impl From<&NormalizedRecord> for CleanedRow {
    fn from(r: &NormalizedRecord) -> Self {
        Self {
            invoice_no: r.invoice_no.clone(),
            stock_code: r.stock_code.clone(),
            description: r.description.clone(),
            quantity: r.quantity,
            invoice_date: r.invoice_timestamp,
            unit_price: r.unit_price,
            customer_id: r.customer_id.clone(),
            country: r.country.clone(),
        }
    }
}

impl From<CleanedRow> for NormalizedRecord {
    fn from(row: CleanedRow) -> Self {
        Self {
            invoice_no: row.invoice_no,
            stock_code: row.stock_code,
            description: row.description,
            quantity: row.quantity,
            invoice_timestamp: row.invoice_date,
            unit_price: row.unit_price,
            customer_id: row.customer_id,
            country: row.country,
        }
    }
}

impl From<&EnrichedRecord> for TransformedRow {
    fn from(e: &EnrichedRecord) -> Self {
        let r = &e.record;
        Self {
            invoice_no: r.invoice_no.clone(),
            stock_code: r.stock_code.clone(),
            description: r.description.clone(),
            quantity: r.quantity,
            invoice_date: r.invoice_timestamp,
            unit_price: r.unit_price,
            customer_id: r.customer_id.clone(),
            country: r.country.clone(),
            total_price: e.total_amount,
        }
    }
}

impl From<TransformedRow> for EnrichedRecord {
    fn from(row: TransformedRow) -> Self {
        Self {
            record: NormalizedRecord {
                invoice_no: row.invoice_no,
                stock_code: row.stock_code,
                description: row.description,
                quantity: row.quantity,
                invoice_timestamp: row.invoice_date,
                unit_price: row.unit_price,
                customer_id: row.customer_id,
                country: row.country,
            },
            total_amount: row.total_price,
        }
    }
}

pub fn write_cleaned<P: AsRef<Path>>(path: P, records: &[NormalizedRecord]) -> Result<()> {
    let file = create_file(path.as_ref())?;
    write_rows(file, records.iter().map(CleanedRow::from))?;
    info!("Wrote {} cleaned rows to {}", records.len(), path.as_ref().display());
    Ok(())
}

pub fn read_cleaned<P: AsRef<Path>>(path: P) -> Result<Vec<NormalizedRecord>> {
    let rows: Vec<CleanedRow> = read_rows(File::open(path.as_ref())?)?;
    Ok(rows.into_iter().map(NormalizedRecord::from).collect())
}

pub fn write_transformed<P: AsRef<Path>>(path: P, records: &[EnrichedRecord]) -> Result<()> {
    let file = create_file(path.as_ref())?;
    write_rows(file, records.iter().map(TransformedRow::from))?;
    info!(
        "Wrote {} transformed rows to {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(())
}

pub fn read_transformed<P: AsRef<Path>>(path: P) -> Result<Vec<EnrichedRecord>> {
    let rows: Vec<TransformedRow> = read_rows(File::open(path.as_ref())?)?;
    Ok(rows.into_iter().map(EnrichedRecord::from).collect())
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(File::create(path)?)
}

fn write_rows<W: Write, T: Serialize>(out: W, rows: impl Iterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_rows<R: Read, T: DeserializeOwned>(input: R) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(input);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
