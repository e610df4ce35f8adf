// Document collection boundary: the trait the loader writes through, plus backends

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryCollection;
pub use sqlite::SqliteCollection;

use crate::constants::{unique_key_fields, UNIQUE_INDEX_NAME};
use crate::error::Result;
use crate::types::StoredDocument;
use async_trait::async_trait;

/// Definition of an index over document fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<&'static str>,
    pub unique: bool,
}

impl IndexSpec {
    /// Compound unique index over every stored field
    pub fn full_record() -> Self {
        Self {
            name: UNIQUE_INDEX_NAME.to_string(),
            fields: unique_key_fields(),
            unique: true,
        }
    }
}

/// Why a single document in a bulk insert was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteFailureKind {
    /// The unique index already holds an identical tuple
    DuplicateKey,
    /// Anything else: bad value, unrelated constraint, etc.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Position of the document within the submitted batch
    pub index: usize,
    pub kind: WriteFailureKind,
}

/// Per-document result of an unordered bulk insert.
///
/// Every document is attempted; rejections are reported here rather than
/// aborting the rest of the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteOutcome {
    pub inserted: usize,
    pub failures: Vec<WriteFailure>,
}

impl BulkWriteOutcome {
    pub fn duplicates(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.kind == WriteFailureKind::DuplicateKey)
            .count()
    }

    /// First rejection that is not a duplicate-key violation, if any
    pub fn first_non_duplicate(&self) -> Option<&WriteFailure> {
        self.failures
            .iter()
            .find(|f| f.kind != WriteFailureKind::DuplicateKey)
    }
}

/// A named collection of StoredDocuments guarded by a unique index
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Create the index if absent. Must be safe to race with other callers.
    async fn ensure_unique_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Attempt every document, continuing past individual rejections.
    /// An `Err` means the batch as a whole failed (connection lost, etc.).
    async fn insert_many_unordered(&self, documents: Vec<StoredDocument>)
        -> Result<BulkWriteOutcome>;

    async fn count_documents(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_splits_duplicates_from_other_failures() {
        let outcome = BulkWriteOutcome {
            inserted: 3,
            failures: vec![
                WriteFailure {
                    index: 1,
                    kind: WriteFailureKind::DuplicateKey,
                },
                WriteFailure {
                    index: 4,
                    kind: WriteFailureKind::Other("NOT NULL constraint failed".to_string()),
                },
                WriteFailure {
                    index: 5,
                    kind: WriteFailureKind::DuplicateKey,
                },
            ],
        };
        assert_eq!(outcome.duplicates(), 2);
        assert_eq!(outcome.first_non_duplicate().map(|f| f.index), Some(4));
    }

    #[test]
    fn test_full_record_index_covers_all_fields() {
        let spec = IndexSpec::full_record();
        assert!(spec.unique);
        assert_eq!(spec.fields.len(), 9);
        assert_eq!(spec.fields.first(), Some(&"InvoiceNo"));
        assert_eq!(spec.fields.last(), Some(&"TotalPrice"));
    }
}
