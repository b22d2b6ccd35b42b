//! Graph backend port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{DocumentId, Metadata};

use crate::error::BackendError;
use crate::kind::BackendKind;

/// Port for the graph store.
///
/// A create writes a single document node and no relationships; edges are
/// added later by collaborators outside this core.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Writes a node for the document. Returns the node ID.
    async fn create(
        &self,
        document_id: &DocumentId,
        metadata: &Metadata,
    ) -> Result<String, BackendError>;

    /// Replaces the properties of an existing node.
    async fn update(&self, node_id: &str, metadata: &Metadata) -> Result<(), BackendError>;

    /// Deletes a node by ID. Absence is not an error.
    async fn delete(&self, node_id: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Clone)]
struct GraphNode {
    document_id: DocumentId,
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct InMemoryGraphState {
    nodes: HashMap<String, GraphNode>,
    next_id: u32,
    unavailable: bool,
    fail_on_create: bool,
    delete_calls: u32,
}

/// In-memory graph backend for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGraphBackend {
    state: Arc<RwLock<InMemoryGraphState>>,
}

impl InMemoryGraphBackend {
    /// Creates a new empty in-memory graph backend.
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

    /// Returns the number of stored nodes.
    pub fn node_count(&self) -> usize {
        self.state.read().unwrap().nodes.len()
    }

    /// Returns true if a node exists for the given document.
    pub fn has_document(&self, document_id: &DocumentId) -> bool {
        self.state
            .read()
            .unwrap()
            .nodes
            .values()
            .any(|n| &n.document_id == document_id)
    }

    /// Returns how many times `delete` was invoked.
    pub fn delete_calls(&self) -> u32 {
        self.state.read().unwrap().delete_calls
    }
}

#[async_trait]
impl GraphBackend for InMemoryGraphBackend {
    async fn create(
        &self,
        document_id: &DocumentId,
        metadata: &Metadata,
    ) -> Result<String, BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Graph,
            });
        }
        if state.fail_on_create {
            return Err(BackendError::failed(BackendKind::Graph, "node write rejected"));
        }

        state.next_id += 1;
        let node_id = format!("node-{:04}", state.next_id);
        state.nodes.insert(
            node_id.clone(),
            GraphNode {
                document_id: document_id.clone(),
                metadata: metadata.clone(),
            },
        );

        Ok(node_id)
    }

    async fn update(&self, node_id: &str, metadata: &Metadata) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Graph,
            });
        }

        let node = state
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| BackendError::NotFound {
                backend: BackendKind::Graph,
                id: node_id.to_string(),
            })?;
        node.metadata = metadata.clone();
        Ok(())
    }

    async fn delete(&self, node_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap();
        state.delete_calls += 1;

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::Graph,
            });
        }

        state.nodes.remove(node_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_update_delete() {
        let backend = InMemoryGraphBackend::new();
        let doc = DocumentId::new("doc-1");

        let node_id = backend.create(&doc, &Metadata::new()).await.unwrap();
        assert!(node_id.starts_with("node-"));
        assert!(backend.has_document(&doc));

        let mut meta = Metadata::new();
        meta.insert("title".to_string(), serde_json::json!("updated"));
        backend.update(&node_id, &meta).await.unwrap();

        backend.delete(&node_id).await.unwrap();
        assert!(!backend.has_document(&doc));
        assert_eq!(backend.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let backend = InMemoryGraphBackend::new();
        backend.delete("node-9999").await.unwrap();
        backend.delete("node-9999").await.unwrap();
        assert_eq!(backend.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let backend = InMemoryGraphBackend::new();
        backend.set_unavailable(true);

        let doc = DocumentId::new("doc-1");
        let err = backend.create(&doc, &Metadata::new()).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_update_missing_node() {
        let backend = InMemoryGraphBackend::new();
        let err = backend
            .update("node-0001", &Metadata::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound { .. }));
    }
}
