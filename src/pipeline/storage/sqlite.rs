use super::{BulkWriteOutcome, DocumentCollection, IndexSpec, WriteFailure, WriteFailureKind};
use crate::constants::*;
use crate::error::{EtlError, Result};
use crate::types::StoredDocument;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Extended result code for a UNIQUE constraint violation (SQLITE_CONSTRAINT | 8 << 8)
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

/// How long a connection waits on another writer's lock before reporting SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timestamp layout of the stored InvoiceDate column
const DATE_COLUMN_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Document collection backed by one SQLite table.
///
/// Each row holds the typed fields the unique index covers plus the full
/// JSON document body.
pub struct SqliteCollection {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteCollection {
    pub fn open<P: AsRef<Path>>(db_path: P, collection: &str) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path.as_ref())?;
        // other processes may hold the same file, e.g. two loaders creating the index
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::with_connection(conn, collection)
    }

    pub fn open_in_memory(collection: &str) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, collection)
    }

    fn with_connection(conn: Connection, collection: &str) -> Result<Self> {
        let table = validate_identifier(collection)?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                doc_id       TEXT NOT NULL,
                invoice_no   TEXT NOT NULL,
                stock_code   TEXT NOT NULL,
                description  TEXT,
                quantity     INTEGER NOT NULL,
                invoice_date TEXT NOT NULL,
                unit_price   TEXT NOT NULL,
                customer_id  TEXT NOT NULL,
                country      TEXT NOT NULL,
                total_price  TEXT NOT NULL,
                body         TEXT NOT NULL
            );
            "#
        ))?;
        info!("Opened SQLite collection {}", table);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            table,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| EtlError::Storage("SQLite connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| EtlError::Storage(format!("SQLite task failed: {e}")))?
    }
}

#[async_trait]
impl DocumentCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.table
    }

    async fn ensure_unique_index(&self, spec: &IndexSpec) -> Result<()> {
        let index = validate_identifier(&spec.name)?;
        let columns = spec
            .fields
            .iter()
            .map(|field| {
                index_column(field).ok_or_else(|| {
                    EtlError::IndexCreation(format!("unknown index field {field}"))
                })
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let unique = if spec.unique { "UNIQUE " } else { "" };
        let sql = format!(
            r#"CREATE {unique}INDEX IF NOT EXISTS "{index}" ON "{}" ({columns})"#,
            self.table
        );

        self.with_conn(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| EtlError::IndexCreation(e.to_string()))
        })
        .await?;
        debug!("Ensured index {} on {}", spec.name, self.table);
        Ok(())
    }

    async fn insert_many_unordered(
        &self,
        documents: Vec<StoredDocument>,
    ) -> Result<BulkWriteOutcome> {
        let sql = format!(
            r#"INSERT INTO "{}" (doc_id, invoice_no, stock_code, description, quantity,
                invoice_date, unit_price, customer_id, country, total_price, body)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            self.table
        );

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut outcome = BulkWriteOutcome::default();
            {
                let mut stmt = tx.prepare_cached(&sql)?;
                for (index, doc) in documents.iter().enumerate() {
                    let body = serde_json::to_string(doc)?;
                    let result = stmt.execute(params![
                        doc.id,
                        doc.invoice_no,
                        doc.stock_code,
                        doc.description,
                        doc.quantity,
                        doc.invoice_date.format(DATE_COLUMN_FORMAT).to_string(),
                        doc.unit_price.normalize().to_string(),
                        doc.customer_id,
                        doc.country,
                        doc.total_price.normalize().to_string(),
                        body,
                    ]);
                    match result {
                        Ok(_) => outcome.inserted += 1,
                        Err(e) => outcome.failures.push(WriteFailure {
                            index,
                            kind: classify_failure(&e),
                        }),
                    }
                }
            }
            // statement-level aborts leave the rest of the transaction intact
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn count_documents(&self) -> Result<usize> {
        let sql = format!(r#"SELECT COUNT(*) FROM "{}""#, self.table);
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

fn classify_failure(err: &rusqlite::Error) -> WriteFailureKind {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == SQLITE_CONSTRAINT_UNIQUE => {
            WriteFailureKind::DuplicateKey
        }
        other => WriteFailureKind::Other(other.to_string()),
    }
}

/// Column expression for an indexed document field.
///
/// SQLite treats NULLs as distinct inside unique indexes, so a missing
/// description is indexed as the empty string.
fn index_column(field: &str) -> Option<&'static str> {
    match field {
        COL_INVOICE_NO => Some("invoice_no"),
        COL_STOCK_CODE => Some("stock_code"),
        COL_DESCRIPTION => Some("IFNULL(description, '')"),
        COL_QUANTITY => Some("quantity"),
        COL_INVOICE_DATE => Some("invoice_date"),
        COL_UNIT_PRICE => Some("unit_price"),
        COL_CUSTOMER_ID => Some("customer_id"),
        COL_COUNTRY => Some("country"),
        COL_TOTAL_PRICE => Some("total_price"),
        _ => None,
    }
}

fn validate_identifier(name: &str) -> Result<String> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name.to_string())
    } else {
        Err(EtlError::Config(format!(
            "invalid collection or index name {name:?}"
        )))
    }
}
