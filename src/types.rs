use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stands in for an absent field inside canonical keys; present fields start with a digit.
const KEY_ABSENT: char = '-';

/// One transaction line as handed over by the file reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub invoice_no: String,
    pub stock_code: String,
    pub description: Option<String>,
    pub quantity: i64,
    /// Unparsed; the normalizer turns this into a point in time
    pub invoice_timestamp: String,
    pub unit_price: Decimal,
    pub customer_id: Option<String>,
    pub country: String,
}

/// A raw record after imputation and type coercion.
///
/// `Decimal` compares and hashes by value, so `2.5` and `2.50` are equal here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedRecord {
    pub invoice_no: String,
    pub stock_code: String,
    /// Still `None` when no row sharing the stock code had a description
    pub description: Option<String>,
    pub quantity: i64,
    pub invoice_timestamp: NaiveDateTime,
    pub unit_price: Decimal,
    /// Always present; absent identifiers carry the missing-customer sentinel
    pub customer_id: String,
    pub country: String,
}

/// Survivor of exact-duplicate removal; same shape as a normalized record.
pub type DeduplicatedRecord = NormalizedRecord;

impl NormalizedRecord {
    /// Canonical serialization of every field.
    ///
    /// Each field is length-prefixed, so distinct records never share a key
    /// whatever characters their text holds. Decimals are normalized so `2.5`
    /// and `2.50` produce the same key.
    pub fn canonical_key(&self) -> String {
        let mut key = String::with_capacity(128);
        push_field(&mut key, Some(&self.invoice_no));
        push_field(&mut key, Some(&self.stock_code));
        push_field(&mut key, self.description.as_deref());
        push_field(&mut key, Some(&self.quantity.to_string()));
        push_field(
            &mut key,
            Some(&self.invoice_timestamp.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        );
        push_field(&mut key, Some(&self.unit_price.normalize().to_string()));
        push_field(&mut key, Some(&self.customer_id));
        push_field(&mut key, Some(&self.country));
        key
    }
}

fn push_field(key: &mut String, value: Option<&str>) {
    match value {
        Some(v) => {
            key.push_str(&v.len().to_string());
            key.push(':');
            key.push_str(v);
        }
        None => key.push(KEY_ABSENT),
    }
}

/// A deduplicated record with its derived line total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRecord {
    pub record: DeduplicatedRecord,
    /// Quantity × UnitPrice, exact
    pub total_amount: Decimal,
}

impl EnrichedRecord {
    /// Key over the full unique-index tuple.
    pub fn unique_key(&self) -> String {
        let mut key = self.record.canonical_key();
        push_field(&mut key, Some(&self.total_amount.normalize().to_string()));
        key
    }
}

/// Persisted shape of an enriched record in the target collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// SHA-256 of the unique key, hex encoded
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "InvoiceNo")]
    pub invoice_no: String,
    #[serde(rename = "StockCode")]
    pub stock_code: String,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "Quantity")]
    pub quantity: i64,
    #[serde(rename = "InvoiceDate")]
    pub invoice_date: NaiveDateTime,
    #[serde(rename = "UnitPrice", with = "rust_decimal::serde::str")]
    pub unit_price: Decimal,
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "Country")]
    pub country: String,
    #[serde(rename = "TotalPrice", with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    /// Canonical unique-index tuple; not part of the document body
    #[serde(skip)]
    pub unique_key: String,
}

impl From<EnrichedRecord> for StoredDocument {
    fn from(enriched: EnrichedRecord) -> Self {
        let unique_key = enriched.unique_key();
        let id = hex::encode(Sha256::digest(unique_key.as_bytes()));
        let EnrichedRecord {
            record,
            total_amount,
        } = enriched;
        Self {
            id,
            invoice_no: record.invoice_no,
            stock_code: record.stock_code,
            description: record.description,
            quantity: record.quantity,
            invoice_date: record.invoice_timestamp,
            unit_price: record.unit_price,
            customer_id: record.customer_id,
            country: record.country,
            total_price: total_amount,
            unique_key,
        }
    }
}
