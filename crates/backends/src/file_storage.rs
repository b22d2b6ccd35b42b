//! File storage backend port and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{DocumentId, Metadata};

use crate::error::BackendError;
use crate::kind::BackendKind;

/// A stored blob, as seen by the in-memory backend's inspection hooks.
#[derive(Debug, Clone)]
pub struct StoredAsset {
    pub document_id: DocumentId,
    pub path: String,
    pub content: Vec<u8>,
    pub metadata: Metadata,
}

/// Port for the blob/file store.
#[async_trait]
pub trait FileStorageBackend: Send + Sync {
    /// Writes the raw content blob. Returns the asset ID.
    async fn create(
        &self,
        document_id: &DocumentId,
        path: &str,
        content: &[u8],
        metadata: &Metadata,
    ) -> Result<String, BackendError>;

    /// Replaces the content of an existing asset.
    async fn update(&self, asset_id: &str, content: &[u8]) -> Result<(), BackendError>;

    /// Deletes a blob by asset ID. Absence is not an error.
    async fn delete(&self, asset_id: &str) -> Result<(), BackendError>;
}

#[derive(Debug, Default)]
struct InMemoryFileStorageState {
    assets: HashMap<String, StoredAsset>,
    next_id: u32,
    unavailable: bool,
    fail_on_create: bool,
    delete_calls: u32,
}

/// In-memory file storage backend for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileStorage {
    state: Arc<RwLock<InMemoryFileStorageState>>,
}

impl InMemoryFileStorage {
    /// Creates a new empty in-memory file storage backend.
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

    /// Returns the number of stored assets.
    pub fn asset_count(&self) -> usize {
        self.state.read().unwrap().assets.len()
    }

    /// Returns the stored asset, if present.
    pub fn asset(&self, asset_id: &str) -> Option<StoredAsset> {
        self.state.read().unwrap().assets.get(asset_id).cloned()
    }

    /// Returns how many times `delete` was invoked.
    pub fn delete_calls(&self) -> u32 {
        self.state.read().unwrap().delete_calls
    }
}

#[async_trait]
impl FileStorageBackend for InMemoryFileStorage {
    async fn create(
        &self,
        document_id: &DocumentId,
        path: &str,
        content: &[u8],
        metadata: &Metadata,
    ) -> Result<String, BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::FileStorage,
            });
        }
        if state.fail_on_create {
            return Err(BackendError::failed(
                BackendKind::FileStorage,
                "blob write rejected",
            ));
        }

        state.next_id += 1;
        let asset_id = format!("asset-{:04}", state.next_id);
        state.assets.insert(
            asset_id.clone(),
            StoredAsset {
                document_id: document_id.clone(),
                path: path.to_string(),
                content: content.to_vec(),
                metadata: metadata.clone(),
            },
        );

        Ok(asset_id)
    }

    async fn update(&self, asset_id: &str, content: &[u8]) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap();

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::FileStorage,
            });
        }

        let asset = state
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| BackendError::NotFound {
                backend: BackendKind::FileStorage,
                id: asset_id.to_string(),
            })?;
        asset.content = content.to_vec();
        Ok(())
    }

    async fn delete(&self, asset_id: &str) -> Result<(), BackendError> {
        let mut state = self.state.write().unwrap();
        state.delete_calls += 1;

        if state.unavailable {
            return Err(BackendError::Unavailable {
                backend: BackendKind::FileStorage,
            });
        }

        state.assets.remove(asset_id);
        Ok(())
    }
}
