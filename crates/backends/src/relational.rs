//! Relational backend port and in-memory implementation.
//!
//! The relational store is the system of record for structured queries.
//! It is the only mandatory backend: its failure always aborts a saga.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DocumentId, DocumentUuid, IdentityKey, Metadata};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::kind::BackendKind;

/// The canonical metadata row for a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    pub document_id: DocumentId,
    pub uuid: DocumentUuid,
    pub content: String,
    pub metadata: Metadata,
    /// SHA-256 hex digest of `content` at write time.
    pub file_hash: String,
    pub identity_key: Option<IdentityKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Port for the relational store.
#[async_trait]
pub trait RelationalBackend: Send + Sync {
    /// Writes the canonical row. Upserts by `document_id` with
    /// last-write-wins semantics; the row ID stays stable across upserts.
    async fn create(&self, row: &DocumentRow) -> Result<String, BackendError>;

    /// Reads the row for a document, if present.
    async fn get(&self, document_id: &DocumentId) -> Result<Option<DocumentRow>, BackendError>;

    /// Replaces an existing row. Fails if the row does not exist.
    async fn update(&self, row: &DocumentRow) -> Result<String, BackendError>;

    /// Deletes the row for a document. Absence is not an error.
    async fn delete(&self, document_id: &DocumentId) -> Result<(), BackendError>;
}

#[derive(Debug, Default)]
struct InMemoryRelationalState {
    rows: HashMap<DocumentId, (String, DocumentRow)>,
    next_id: u32,
    unavailable: bool,
    fail_on_create: bool,
    fail_on_update: bool,
    fail_on_delete: bool,
    tamper_stored_hash: bool,
    delete_calls: u32,
}

/// In-memory relational backend for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelationalBackend {
    state: Arc<RwLock<InMemoryRelationalState>>,
}

impl InMemoryRelationalBackend {
    /// Creates a new empty in-memory relational backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a backend that is not configured or reachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Configures the backend to reject row inserts.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Configures the backend to reject row updates.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update = fail;
    }

    /// Configures the backend to reject row deletes.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state.write().unwrap().fail_on_delete = fail;
    }

    /// Corrupts the `file_hash` of rows as they are stored.
    ///
    /// Writes still report success; only a later read-back reveals the
    /// divergence. Exercises the consistency validator.
    pub fn set_tamper_stored_hash(&self, tamper: bool) {
        self.state.write().unwrap().tamper_stored_hash = tamper;
    }

    /// Returns the number of stored rows.
    pub fn row_count(&self) -> usize {
        self.state.read().unwrap().rows.len()
    }

    /// Returns the stored row for a document, if present.
    pub fn row(&self, document_id: &DocumentId) -> Option<DocumentRow> {
        self.state
            .read()
            .unwrap()
            .rows
            .get(document_id)
            .map(|(_, row)| row.clone())
    }

    /// Returns how many times `delete` was invoked.
    pub fn delete_calls(&self) -> u32 {
        self.state.read().unwrap().delete_calls
    }

    fn store(state: &mut InMemoryRelationalState, row: &DocumentRow, row_id: String) -> String {
        let mut stored = row.clone();
        if state.tamper_stored_hash {
            stored.file_hash = format!("tampered-{}", stored.file_hash);
        }
        state
            .rows
            .insert(row.document_id.clone(), (row_id.clone(), stored));
        row_id
    }
}

#[async_trait]
impl RelationalBackend for InMemoryRelationalBackend {
    async fn create(&self, row: &DocumentRow) -> Result<String, BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Relational,
            });
        }
        if state.fail_on_create {
            return Err(BackendError::failed(
                BackendKind::Relational,
                "row insert rejected",
            ));
        }

        // Upsert: reuse the row ID when the document already has one.
        let row_id = match state.rows.get(&row.document_id) {
            Some((existing_id, _)) => existing_id.clone(),
            None => {
                state.next_id += 1;
                format!("row-{:04}", state.next_id)
            }
        };

        Ok(Self::store(&mut state, row, row_id))
    }

    async fn get(&self, document_id: &DocumentId) -> Result<Option<DocumentRow>, BackendError> {
        let state = self.state.read().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Relational,
            });
        }

        Ok(state.rows.get(document_id).map(|(_, row)| row.clone()))
    }

    async fn update(&self, row: &DocumentRow) -> Result<String, BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Relational,
            });
        }
        if state.fail_on_update {
            return Err(BackendError::failed(
                BackendKind::Relational,
                "row update rejected",
            ));
        }

        let row_id = state
            .rows
            .get(&row.document_id)
            .map(|(id, _)| id.clone())
            .ok_or_else(|| BackendError::NotFound {
                backend: BackendKind::Relational,
                id: row.document_id.to_string(),
            })?;

        Ok(Self::store(&mut state, row, row_id))
    }

    async fn delete(&self, document_id: &DocumentId) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap();
        state.delete_calls += 1;

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Relational,
            });
        }
        if state.fail_on_delete {
            return Err(BackendError::failed(
                BackendKind::Relational,
                "row delete rejected",
            ));
        }

        state.rows.remove(document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(document_id: &str) -> DocumentRow {
        let now = Utc::now();
        DocumentRow {
            document_id: DocumentId::new(document_id),
            uuid: DocumentUuid::new(),
            content: "hello world".to_string(),
            metadata: Metadata::new(),
            file_hash: common::sha256_hex(b"hello world"),
            identity_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let backend = InMemoryRelationalBackend::new();
        let row = sample_row("doc-1");

        let row_id = backend.create(&row).await.unwrap();
        assert!(row_id.starts_with("row-"));

        let stored = backend.get(&row.document_id).await.unwrap().unwrap();
        assert_eq!(stored, row);

        backend.delete(&row.document_id).await.unwrap();
        assert!(backend.get(&row.document_id).await.unwrap().is_none());
        assert_eq!(backend.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_create_upserts_with_stable_row_id() {
        let backend = InMemoryRelationalBackend::new();
        let mut row = sample_row("doc-1");

        let first_id = backend.create(&row).await.unwrap();
        row.content = "revised".to_string();
        row.file_hash = common::sha256_hex(b"revised");
        let second_id = backend.create(&row).await.unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(backend.row_count(), 1);
        assert_eq!(
            backend.row(&row.document_id).unwrap().content,
            "revised"
        );
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let backend = InMemoryRelationalBackend::new();
        let row = sample_row("doc-1");

        let err = backend.update(&row).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_tampered_hash_survives_until_read_back() {
        let backend = InMemoryRelationalBackend::new();
        backend.set_tamper_stored_hash(true);
        let row = sample_row("doc-1");

        backend.create(&row).await.unwrap();

        let stored = backend.get(&row.document_id).await.unwrap().unwrap();
        assert_ne!(stored.file_hash, row.file_hash);
        assert!(stored.file_hash.starts_with("tampered-"));
    }

    #[tokio::test]
    async fn test_write_failure() {
        let backend = InMemoryRelationalBackend::new();
        backend.set_fail_on_create(true);

        let err = backend.create(&sample_row("doc-1")).await.unwrap_err();
        assert!(matches!(err, BackendError::OperationFailed { .. }));
        assert_eq!(backend.row_count(), 0);
    }
}
