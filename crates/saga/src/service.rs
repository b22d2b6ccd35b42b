//! The document store: the public facade over the saga machinery.
//!
//! Serializes operations per document with an async lock map, runs the
//! appropriate saga, and flattens the run into one result value.

use std::collections::HashMap;
use std::sync::Arc;

use backends::BackendKind;
use common::{DocumentId, DocumentUuid, Metadata};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use crate::sagas::SagaDeps;

use crate::config::StoreConfig;
use crate::context::{BackendOutcome, SagaContext};
use crate::mapping::MappingIndex;
use crate::runner::{SagaReport, SagaRunner};
use crate::sagas;
use crate::validator::ValidationResult;

/// Request to create a document. When `document_id` is `None` the store
/// derives one from the minted UUID.
#[derive(Debug, Clone)]
pub struct CreateDocumentRequest {
    pub document_id: Option<DocumentId>,
    pub content: String,
    pub metadata: Metadata,
}

/// Request to update an existing document's content and metadata.
#[derive(Debug, Clone)]
pub struct UpdateDocumentRequest {
    pub document_id: DocumentId,
    pub content: String,
    pub metadata: Metadata,
}

/// Flat outcome of one document operation, per-backend detail included.
#[derive(Debug, Serialize)]
pub struct DocumentOperationResult {
    pub success: bool,
    pub document_id: Option<DocumentId>,
    pub uuid: Option<DocumentUuid>,
    pub backends: HashMap<BackendKind, BackendOutcome>,
    pub warnings: Vec<String>,
    pub quality_score: Option<f64>,
    pub validation: Option<ValidationResult>,
    pub failed_step: Option<&'static str>,
    pub error: Option<String>,
}

impl DocumentOperationResult {
    fn from_run(report: SagaReport, ctx: SagaContext) -> Self {
        Self {
            success: report.success(),
            document_id: ctx.document_id.clone(),
            uuid: ctx.uuid,
            quality_score: ctx.validation.as_ref().map(|v| v.quality_score),
            validation: ctx.validation.clone(),
            backends: ctx.backend_results().clone(),
            warnings: ctx.warnings().to_vec(),
            failed_step: report.failed_step,
            error: report.error.map(|e| e.to_string()),
        }
    }
}

/// Orchestrates document operations across the four backends.
///
/// Operations on the same document are serialized; operations on
/// different documents run concurrently. Clone freely, all clones share
/// the same index and lock map.
#[derive(Clone)]
pub struct DocumentStore {
    deps: SagaDeps,
    index: MappingIndex,
    config: StoreConfig,
    locks: Arc<Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>>,
}

impl DocumentStore {
    pub fn new(deps: SagaDeps, config: StoreConfig) -> Self {
        Self::with_index(deps, config, MappingIndex::new())
    }

    /// Builds a store over an existing index, for example one loaded
    /// from a snapshot.
    pub fn with_index(deps: SagaDeps, config: StoreConfig, index: MappingIndex) -> Self {
        Self {
            deps,
            index,
            config,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The mapping index behind this store.
    pub fn index(&self) -> &MappingIndex {
        &self.index
    }

    /// Takes the per-document lock, creating it on first use.
    async fn lock_document(&self, document_id: &DocumentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(document_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drops a document's lock entry once nobody holds or awaits it.
    /// Keeps the lock map from growing with every document ever touched.
    async fn evict_lock(&self, document_id: &DocumentId) {
        let mut locks = self.locks.lock().await;
        if locks
            .get(document_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(document_id);
        }
    }

    /// Runs the create saga for one document.
    ///
    /// The per-document lock is taken only when the caller supplied a
    /// document ID; a derived ID cannot collide with a concurrent
    /// operation.
    #[tracing::instrument(skip(self, request), fields(document_id = ?request.document_id))]
    pub async fn create_document(&self, request: CreateDocumentRequest) -> DocumentOperationResult {
        let guard = match &request.document_id {
            Some(id) => Some((id.clone(), self.lock_document(id).await)),
            None => None,
        };

        let mut ctx =
            SagaContext::for_create(request.document_id, request.content, request.metadata);
        let steps = sagas::create::steps(&self.deps, &self.index, &self.config);
        let report = SagaRunner::new(sagas::CREATE_SAGA)
            .execute(&steps, &mut ctx)
            .await;

        if let Some((id, guard)) = guard {
            drop(guard);
            self.evict_lock(&id).await;
        }
        DocumentOperationResult::from_run(report, ctx)
    }

    /// Runs the update saga for one document.
    #[tracing::instrument(skip(self, request), fields(document_id = %request.document_id))]
    pub async fn update_document(&self, request: UpdateDocumentRequest) -> DocumentOperationResult {
        let document_id = request.document_id.clone();
        let guard = self.lock_document(&document_id).await;

        let mut ctx =
            SagaContext::for_existing(request.document_id, request.content, request.metadata);
        let steps = sagas::update::steps(&self.deps, &self.index, &self.config);
        let report = SagaRunner::new(sagas::UPDATE_SAGA)
            .execute(&steps, &mut ctx)
            .await;

        drop(guard);
        self.evict_lock(&document_id).await;
        DocumentOperationResult::from_run(report, ctx)
    }

    /// Runs the delete saga for one document.
    #[tracing::instrument(skip(self))]
    pub async fn delete_document(&self, document_id: DocumentId) -> DocumentOperationResult {
        let guard = self.lock_document(&document_id).await;

        let mut ctx =
            SagaContext::for_existing(document_id.clone(), String::new(), Metadata::new());
        let steps = sagas::delete::steps(&self.deps, &self.index, &self.config);
        let report = SagaRunner::new(sagas::DELETE_SAGA)
            .execute(&steps, &mut ctx)
            .await;

        drop(guard);
        self.evict_lock(&document_id).await;
        DocumentOperationResult::from_run(report, ctx)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
