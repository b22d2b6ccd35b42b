//! Vector/embedding backend port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{DocumentId, Metadata};

use crate::error::BackendError;
use crate::kind::BackendKind;

/// Port for the vector/embedding store.
///
/// Create is intentionally not idempotent: every call mints a new record,
/// so re-creating an existing document accumulates duplicates unless the
/// caller deletes first.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Writes embedding chunks for a document. Returns the record ID.
    async fn create(
        &self,
        document_id: &DocumentId,
        chunks: &[String],
        metadata: &Metadata,
    ) -> Result<String, BackendError>;

    /// Replaces the stored chunks and metadata for a document.
    async fn update(
        &self,
        document_id: &DocumentId,
        chunks: &[String],
        metadata: &Metadata,
    ) -> Result<String, BackendError>;

    /// Deletes all chunks for a document. Absence is not an error.
    async fn delete(&self, document_id: &DocumentId) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
struct VectorRecord {
    document_id: DocumentId,
    chunks: Vec<String>,
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct InMemoryVectorState {
    records: HashMap<String, VectorRecord>,
    next_id: u32,
    unavailable: bool,
    fail_on_create: bool,
    delete_calls: u32,
}

/// In-memory vector backend for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorBackend {
    state: Arc<RwLock<InMemoryVectorState>>,
}

impl InMemoryVectorBackend {
    /// Creates a new empty in-memory vector backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a backend that is not configured or reachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Configures the backend to fail write operations.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of stored records.
    pub fn record_count(&self) -> usize {
        self.state.read().unwrap().records.len()
    }

    /// Returns the number of records stored for a document.
    pub fn records_for(&self, document_id: &DocumentId) -> usize {
        self.state
            .read()
            .unwrap()
            .records
            .values()
            .filter(|r| &r.document_id == document_id)
            .count()
    }

    /// Returns the total number of chunks stored for a document.
    pub fn chunks_for(&self, document_id: &DocumentId) -> usize {
        self.state
            .read()
            .unwrap()
            .records
            .values()
            .filter(|r| &r.document_id == document_id)
            .map(|r| r.chunks.len())
            .sum()
    }

    /// Returns how many times `delete` was invoked.
    pub fn delete_calls(&self) -> u32 {
        self.state.read().unwrap().delete_calls
    }
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn create(
        &self,
        document_id: &DocumentId,
        chunks: &[String],
        metadata: &Metadata,
    ) -> Result<String, BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Vector,
            });
        }
        if state.fail_on_create {
            return Err(BackendError::failed(
                BackendKind::Vector,
                "embedding write rejected",
            ));
        }

        state.next_id += 1;
        let record_id = format!("vec-{:04}", state.next_id);
        state.records.insert(
            record_id.clone(),
            VectorRecord {
                document_id: document_id.clone(),
                chunks: chunks.to_vec(),
                metadata: metadata.clone(),
            },
        );

        Ok(record_id)
    }

    async fn update(
        &self,
        document_id: &DocumentId,
        chunks: &[String],
        metadata: &Metadata,
    ) -> Result<String, BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Vector,
            });
        }
        if state.fail_on_create {
            return Err(BackendError::failed(
                BackendKind::Vector,
                "embedding write rejected",
            ));
        }

        let record_id = state
            .records
            .iter()
            .find(|(_, r)| &r.document_id == document_id)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| BackendError::NotFound {
                backend: BackendKind::Vector,
                id: document_id.to_string(),
            })?;

        let record = state.records.get_mut(&record_id).unwrap();
        record.chunks = chunks.to_vec();
        record.metadata = metadata.clone();

        Ok(record_id)
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap();
        state.delete_calls += 1;

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Vector,
            });
        }

        state.records.retain(|_, r| &r.document_id != document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<String> {
        vec!["first chunk".to_string(), "second chunk".to_string()]
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let backend = InMemoryVectorBackend::new();
        let doc = DocumentId::new("doc-1");

        let id = backend
            .create(&doc, &chunks(), &Metadata::new())
            .await
            .unwrap();
        assert!(id.starts_with("vec-"));
        assert_eq!(backend.records_for(&doc), 1);

        backend.delete(&doc).await.unwrap();
        assert_eq!(backend.records_for(&doc), 0);
        assert_eq!(backend.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_is_not_idempotent() {
        let backend = InMemoryVectorBackend::new();
        let doc = DocumentId::new("doc-1");

        backend
            .create(&doc, &chunks(), &Metadata::new())
            .await
            .unwrap();
        backend
            .create(&doc, &chunks(), &Metadata::new())
            .await
            .unwrap();

        assert_eq!(backend.records_for(&doc), 2);
    }

    #[tokio::test]
    async fn test_delete_of_absent_document_is_not_an_error() {
        let backend = InMemoryVectorBackend::new();
        let doc = DocumentId::new("ghost");

        backend.delete(&doc).await.unwrap();
        backend.delete(&doc).await.unwrap();
        assert_eq!(backend.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let backend = InMemoryVectorBackend::new();
        backend.set_unavailable(true);

        let doc = DocumentId::new("doc-1");
        let err = backend
            .create(&doc, &chunks(), &Metadata::new())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let backend = InMemoryVectorBackend::new();
        let doc = DocumentId::new("doc-1");

        let err = backend
            .update(&doc, &chunks(), &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }
}
