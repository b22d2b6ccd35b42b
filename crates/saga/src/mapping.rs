//! Document mapping index.
//!
//! The single source of truth tying a `document_id` to every
//! backend-specific record ID. Owned exclusively by the orchestrator:
//! entries appear only when a create saga fully succeeds, change only
//! through update sagas, and disappear only through delete sagas.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{DocumentId, DocumentUuid, IdentityKey};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SagaError;

/// Durable record mapping one document to its backend record IDs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMapping {
    pub document_id: DocumentId,
    pub uuid: DocumentUuid,
    pub vector_id: Option<String>,
    pub graph_id: Option<String>,
    pub relational_id: Option<String>,
    pub file_storage_id: Option<String>,
    pub identity_key: Option<IdentityKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Concurrent map of document IDs to mapping entries.
///
/// Readers may be concurrent; writes serialize through the lock. The
/// per-document write discipline (one saga at a time per document) is
/// enforced upstream by the document store's per-document locks.
#[derive(Debug, Clone, Default)]
pub struct MappingIndex {
    entries: Arc<RwLock<HashMap<DocumentId, DocumentMapping>>>,
}

impl MappingIndex {
    /// Creates a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for a document.
    pub async fn put(&self, entry: DocumentMapping) {
        self.entries
            .write()
            .await
            .insert(entry.document_id.clone(), entry);
    }

    /// Point lookup by document ID.
    pub async fn get(&self, document_id: &DocumentId) -> Option<DocumentMapping> {
        self.entries.read().await.get(document_id).cloned()
    }

    /// Removes and returns the entry for a document.
    pub async fn remove(&self, document_id: &DocumentId) -> Option<DocumentMapping> {
        self.entries.write().await.remove(document_id)
    }

    /// Number of mapped documents.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// All entries, ordered by document ID. Supports audit and rebuild.
    pub async fn entries(&self) -> Vec<DocumentMapping> {
        let mut all: Vec<DocumentMapping> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        all
    }

    /// Writes a JSON snapshot of the index.
    pub async fn save_to_path(&self, path: &Path) -> Result<(), SagaError> {
        let entries = self.entries().await;
        let json = serde_json::to_vec_pretty(&entries).map_err(|e| {
            SagaError::MappingPersistence {
                reason: e.to_string(),
            }
        })?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| SagaError::MappingPersistence {
                reason: e.to_string(),
            })
    }

    /// Loads an index from a JSON snapshot written by `save_to_path`.
    pub async fn load_from_path(path: &Path) -> Result<Self, SagaError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SagaError::MappingPersistence {
                reason: e.to_string(),
            })?;
        let entries: Vec<DocumentMapping> =
            serde_json::from_slice(&bytes).map_err(|e| SagaError::MappingPersistence {
                reason: e.to_string(),
            })?;

        let index = Self::new();
        {
            let mut map = index.entries.write().await;
            for entry in entries {
                map.insert(entry.document_id.clone(), entry);
            }
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(document_id: &str) -> DocumentMapping {
        let now = Utc::now();
        DocumentMapping {
            document_id: DocumentId::new(document_id),
            uuid: DocumentUuid::new(),
            vector_id: Some("vec-0001".to_string()),
            graph_id: Some("node-0001".to_string()),
            relational_id: Some("row-0001".to_string()),
            file_storage_id: Some("asset-0001".to_string()),
            identity_key: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_put_get_remove() {
        let index = MappingIndex::new();
        let e = entry("doc-1");

        index.put(e.clone()).await;
        assert_eq!(index.get(&e.document_id).await, Some(e.clone()));
        assert_eq!(index.len().await, 1);

        assert_eq!(index.remove(&e.document_id).await, Some(e.clone()));
        assert!(index.get(&e.document_id).await.is_none());
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let index = MappingIndex::new();
        let mut e = entry("doc-1");
        index.put(e.clone()).await;

        e.vector_id = Some("vec-0002".to_string());
        index.put(e.clone()).await;

        assert_eq!(
            index.get(&e.document_id).await.unwrap().vector_id.as_deref(),
            Some("vec-0002")
        );
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_entries_are_sorted() {
        let index = MappingIndex::new();
        index.put(entry("doc-b")).await;
        index.put(entry("doc-a")).await;

        let all = index.entries().await;
        assert_eq!(all[0].document_id.as_str(), "doc-a");
        assert_eq!(all[1].document_id.as_str(), "doc-b");
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let dir = std::env::temp_dir().join(format!("mapping-index-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("index.json");

        let index = MappingIndex::new();
        index.put(entry("doc-1")).await;
        index.put(entry("doc-2")).await;
        index.save_to_path(&path).await.unwrap();

        let loaded = MappingIndex::load_from_path(&path).await.unwrap();
        assert_eq!(loaded.len().await, 2);
        assert_eq!(loaded.entries().await, index.entries().await);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_fails() {
        let path = std::env::temp_dir().join("definitely-not-here.json");
        let err = MappingIndex::load_from_path(&path).await.unwrap_err();
        assert!(matches!(err, SagaError::MappingPersistence { .. }));
    }
}
