//! Names and defaults shared between the CLI, config and pipeline stages.

// Artifact file names inside the data directory
pub const RAW_FILE: &str = "online_retail.csv";
pub const CLEANED_FILE: &str = "cleaned_online_retail.csv";
pub const TRANSFORMED_FILE: &str = "transformed_online_retail.csv";

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_DATABASE_PATH: &str = "data/online_retail.db";
pub const DEFAULT_COLLECTION: &str = "retail_transactions";

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 60;

/// Stored in place of an absent CustomerID. Earlier loads of this dataset
/// wrote this exact string, so it must not change or re-runs stop matching.
pub const MISSING_CUSTOMER_ID: &str = "nan";

/// Name of the compound unique index guarding the collection.
pub const UNIQUE_INDEX_NAME: &str = "uniq_full_record";

// Column headers of the source dataset
pub const COL_INVOICE_NO: &str = "InvoiceNo";
pub const COL_STOCK_CODE: &str = "StockCode";
pub const COL_DESCRIPTION: &str = "Description";
pub const COL_QUANTITY: &str = "Quantity";
pub const COL_INVOICE_DATE: &str = "InvoiceDate";
pub const COL_UNIT_PRICE: &str = "UnitPrice";
pub const COL_CUSTOMER_ID: &str = "CustomerID";
pub const COL_COUNTRY: &str = "Country";
pub const COL_TOTAL_PRICE: &str = "TotalPrice";

/// Fields covered by the unique index, in index order.
pub fn unique_key_fields() -> Vec<&'static str> {
    vec![
        COL_INVOICE_NO,
        COL_STOCK_CODE,
        COL_DESCRIPTION,
        COL_QUANTITY,
        COL_INVOICE_DATE,
        COL_UNIT_PRICE,
        COL_CUSTOMER_ID,
        COL_COUNTRY,
        COL_TOTAL_PRICE,
    ]
}
