//! The seven-step document create saga.
//!
//! Order: security_and_identity, vector_create, graph_create,
//! relational_create, file_storage_create, identity_mapping,
//! validation_and_finalize. The mapping index gains an entry only in
//! the terminal step, so a rolled-back create leaves no trace.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backends::{BackendKind, DocumentRow};
use chrono::Utc;
use common::{DocumentId, IdentityKey};

use crate::config::StoreConfig;
use crate::context::SagaContext;
use crate::error::SagaError;
use crate::mapping::{DocumentMapping, MappingIndex};
use crate::sagas::{
    self, BindIdentityStep, SagaDeps, STEP_FILE_STORAGE_CREATE, STEP_GRAPH_CREATE,
    STEP_IDENTITY_MAPPING, STEP_RELATIONAL_CREATE, STEP_SECURITY_AND_IDENTITY,
    STEP_VALIDATION_AND_FINALIZE, STEP_VECTOR_CREATE,
};
use crate::step::{SagaStep, StepOutcome};
use crate::validator::ConsistencyValidator;

/// Builds the ordered step list for creating one document.
pub fn steps(
    deps: &SagaDeps,
    index: &MappingIndex,
    config: &StoreConfig,
) -> Vec<Box<dyn SagaStep>> {
    vec![
        Box::new(SecurityIdentityStep {
            identity: deps.identity.clone(),
            source_system: config.source_system.clone(),
        }),
        Box::new(VectorCreateStep {
            vector: deps.vector.clone(),
            chunk_size: config.chunk_size,
            timeout: config.step_timeout,
        }),
        Box::new(GraphCreateStep {
            graph: deps.graph.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(RelationalCreateStep {
            relational: deps.relational.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(FileStorageCreateStep {
            file_storage: deps.file_storage.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(BindIdentityStep {
            identity: deps.identity.clone(),
            name: STEP_IDENTITY_MAPPING,
        }),
        Box::new(FinalizeCreateStep {
            relational: deps.relational.clone(),
            index: index.clone(),
            timeout: config.step_timeout,
        }),
    ]
}

/// Step 1: hashes the content, mints and registers the canonical UUID,
/// and derives a document ID when the caller supplied none.
///
/// Identity errors here are hard: without a registered UUID nothing
/// downstream can be bound. Compensation clears the context but leaves
/// the registration in place, since UUIDs are never recycled and
/// re-registration is idempotent.
struct SecurityIdentityStep {
    identity: Arc<dyn identity::IdentityService>,
    source_system: String,
}

#[async_trait]
impl SagaStep for SecurityIdentityStep {
    fn name(&self) -> &'static str {
        STEP_SECURITY_AND_IDENTITY
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        ctx.file_hash = Some(common::sha256_hex(ctx.content.as_bytes()));

        ctx.identity_key = ctx
            .metadata
            .get("identity_key")
            .and_then(|v| v.as_str())
            .map(IdentityKey::new);

        let uuid = self
            .identity
            .generate_uuid(&self.source_system, ctx.identity_key.as_ref())
            .await
            .map_err(|e| SagaError::Identity {
                reason: e.to_string(),
            })?;

        self.identity
            .register_uuid(uuid, &self.source_system, ctx.identity_key.as_ref())
            .await
            .map_err(|e| SagaError::Identity {
                reason: e.to_string(),
            })?;

        ctx.uuid = Some(uuid);
        if ctx.document_id.is_none() {
            ctx.document_id = Some(DocumentId::derived_from(&uuid));
        }

        Ok(StepOutcome::Completed)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        ctx.uuid = None;
        ctx.file_hash = None;
        ctx.identity_key = None;
        Ok(())
    }
}

/// Step 2: chunks the content and writes the embeddings. Optional.
struct VectorCreateStep {
    vector: Arc<dyn backends::VectorBackend>,
    chunk_size: usize,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for VectorCreateStep {
    fn name(&self) -> &'static str {
        STEP_VECTOR_CREATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();
        let chunks = sagas::chunk_content(&ctx.content, self.chunk_size);

        let result = sagas::call_with_deadline(
            BackendKind::Vector,
            self.timeout,
            self.vector.create(&document_id, &chunks, &ctx.metadata),
        )
        .await;

        sagas::optional_with_id(ctx, BackendKind::Vector, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        if ctx.record_id(BackendKind::Vector).is_none() {
            return Ok(());
        }
        let document_id = ctx.require_document_id()?;
        self.vector.delete(document_id).await?;
        Ok(())
    }
}

/// Step 3: creates the graph node. Optional.
struct GraphCreateStep {
    graph: Arc<dyn backends::GraphBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for GraphCreateStep {
    fn name(&self) -> &'static str {
        STEP_GRAPH_CREATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();

        let result = sagas::call_with_deadline(
            BackendKind::Graph,
            self.timeout,
            self.graph.create(&document_id, &ctx.metadata),
        )
        .await;

        sagas::optional_with_id(ctx, BackendKind::Graph, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        if let Some(node_id) = ctx.record_id(BackendKind::Graph).map(String::from) {
            self.graph.delete(&node_id).await?;
        }
        Ok(())
    }
}

/// Step 4: writes the system-of-record row. Mandatory.
///
/// The write is an upsert keyed by document ID, so retrying a create
/// for the same document converges instead of duplicating rows.
struct RelationalCreateStep {
    relational: Arc<dyn backends::RelationalBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for RelationalCreateStep {
    fn name(&self) -> &'static str {
        STEP_RELATIONAL_CREATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let row = DocumentRow {
            document_id: ctx.require_document_id()?.clone(),
            uuid: ctx.require_uuid()?,
            content: ctx.content.clone(),
            metadata: ctx.metadata.clone(),
            file_hash: ctx.require_file_hash()?.to_string(),
            identity_key: ctx.identity_key.clone(),
            created_at: ctx.started_at,
            updated_at: ctx.started_at,
        };

        let result = sagas::call_with_deadline(
            BackendKind::Relational,
            self.timeout,
            self.relational.create(&row),
        )
        .await;

        sagas::mandatory_with_id(ctx, BackendKind::Relational, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        let document_id = ctx.require_document_id()?;
        self.relational.delete(document_id).await?;
        Ok(())
    }
}

/// Step 5: stores the raw content blob. Optional.
struct FileStorageCreateStep {
    file_storage: Arc<dyn backends::FileStorageBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for FileStorageCreateStep {
    fn name(&self) -> &'static str {
        STEP_FILE_STORAGE_CREATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();
        let path = sagas::blob_path(&document_id);

        let result = sagas::call_with_deadline(
            BackendKind::FileStorage,
            self.timeout,
            self.file_storage
                .create(&document_id, &path, ctx.content.as_bytes(), &ctx.metadata),
        )
        .await;

        sagas::optional_with_id(ctx, BackendKind::FileStorage, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        if let Some(asset_id) = ctx.record_id(BackendKind::FileStorage).map(String::from) {
            self.file_storage.delete(&asset_id).await?;
        }
        Ok(())
    }
}

/// Step 7: reads the relational row back, validates cross-backend
/// agreement, and publishes the mapping entry.
///
/// A validation failure is hard and rolls back everything written so
/// far; the index is touched only after validation passes.
struct FinalizeCreateStep {
    relational: Arc<dyn backends::RelationalBackend>,
    index: MappingIndex,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for FinalizeCreateStep {
    fn name(&self) -> &'static str {
        STEP_VALIDATION_AND_FINALIZE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();

        let row = sagas::call_with_deadline(
            BackendKind::Relational,
            self.timeout,
            self.relational.get(&document_id),
        )
        .await?;
        ctx.persisted_hash = row.map(|r| r.file_hash);

        let result = ConsistencyValidator::validate(ctx);
        let summary = result.failure_summary();
        let valid = result.overall_valid;
        ctx.validation = Some(result);

        if !valid {
            return Err(SagaError::ValidationFailed { reason: summary });
        }

        let now = Utc::now();
        let mapping = DocumentMapping {
            document_id: document_id.clone(),
            uuid: ctx.require_uuid()?,
            vector_id: ctx.record_id(BackendKind::Vector).map(String::from),
            graph_id: ctx.record_id(BackendKind::Graph).map(String::from),
            relational_id: ctx.record_id(BackendKind::Relational).map(String::from),
            file_storage_id: ctx.record_id(BackendKind::FileStorage).map(String::from),
            identity_key: ctx.identity_key.clone(),
            created_at: ctx.started_at,
            updated_at: now,
        };
        self.index.put(mapping.clone()).await;
        ctx.mapping = Some(mapping);

        Ok(StepOutcome::Completed)
    }
}
