use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Malformed input at line {line}: field {field} has invalid value {value:?}")]
    MalformedInput {
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("Failed to ensure unique index: {0}")]
    IndexCreation(String),

    #[error("Storage failure in batch starting at row {batch_start}: {reason}")]
    StorageFatal { batch_start: usize, reason: String },

    #[error("Batch starting at row {batch_start} timed out after {timeout_secs}s")]
    BatchTimeout { batch_start: usize, timeout_secs: u64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Whether the error aborted the run after some batches may already have been committed.
    pub fn is_partial_load(&self) -> bool {
        matches!(
            self,
            EtlError::StorageFatal { .. } | EtlError::BatchTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
