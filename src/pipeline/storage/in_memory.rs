use super::{BulkWriteOutcome, DocumentCollection, IndexSpec, WriteFailure, WriteFailureKind};
use crate::error::{EtlError, Result};
use crate::types::StoredDocument;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct CollectionState {
    unique_index: Option<IndexSpec>,
    documents: Vec<StoredDocument>,
    keys: HashSet<String>,
}

/// In-memory collection for tests and dry runs
#[derive(Clone)]
pub struct InMemoryCollection {
    name: String,
    state: Arc<Mutex<CollectionState>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(CollectionState::default())),
        }
    }

    /// Snapshot of stored documents in insertion order
    pub fn documents(&self) -> Vec<StoredDocument> {
        self.lock().map(|s| s.documents.clone()).unwrap_or_default()
    }

    pub fn has_unique_index(&self) -> bool {
        self.lock()
            .map(|s| s.unique_index.is_some())
            .unwrap_or(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, CollectionState>> {
        self.state
            .lock()
            .map_err(|_| EtlError::Storage(format!("collection {} lock poisoned", self.name)))
    }
}

#[async_trait]
impl DocumentCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_unique_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut state = self.lock()?;
        match &state.unique_index {
            Some(existing) if existing == spec => {
                debug!("Unique index {} already present on {}", spec.name, self.name);
                Ok(())
            }
            // only one unique index per collection
            Some(existing) => Err(EtlError::IndexCreation(format!(
                "collection {} already has index {} over {:?}; cannot create {} over {:?}",
                self.name, existing.name, existing.fields, spec.name, spec.fields
            ))),
            None => {
                if state.keys.len() != state.documents.len() {
                    return Err(EtlError::IndexCreation(format!(
                        "collection {} already holds duplicate documents",
                        self.name
                    )));
                }
                state.unique_index = Some(spec.clone());
                debug!("Created unique index {} on {}", spec.name, self.name);
                Ok(())
            }
        }
    }

    async fn insert_many_unordered(
        &self,
        documents: Vec<StoredDocument>,
    ) -> Result<BulkWriteOutcome> {
        let mut state = self.lock()?;
        let enforce_unique = state.unique_index.is_some();
        let mut outcome = BulkWriteOutcome::default();

        for (index, doc) in documents.into_iter().enumerate() {
            let is_new = state.keys.insert(doc.unique_key.clone());
            if enforce_unique && !is_new {
                outcome.failures.push(WriteFailure {
                    index,
                    kind: WriteFailureKind::DuplicateKey,
                });
                continue;
            }
            state.documents.push(doc);
            outcome.inserted += 1;
        }

        debug!(
            "Inserted {} documents into {} ({} rejected)",
            outcome.inserted,
            self.name,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    async fn count_documents(&self) -> Result<usize> {
        Ok(self.lock()?.documents.len())
    }
}
