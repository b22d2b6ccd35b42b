//! The document update saga.
//!
//! Mirrors the create order, with two differences: step 1 loads the
//! existing mapping (and captures the prior relational row for
//! rollback) instead of minting identity, and each backend step updates
//! in place. A backend the mapping has no record ID for is written via
//! create instead, which heals documents created while that optional
//! backend was unavailable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backends::{BackendKind, DocumentRow};
use chrono::Utc;

use crate::config::StoreConfig;
use crate::context::SagaContext;
use crate::error::SagaError;
use crate::mapping::MappingIndex;
use crate::sagas::{
    self, BindIdentityStep, LoadMappingStep, SagaDeps, STEP_FILE_STORAGE_UPDATE,
    STEP_GRAPH_UPDATE, STEP_IDENTITY_REBIND, STEP_RELATIONAL_UPDATE,
    STEP_VALIDATION_AND_FINALIZE, STEP_VECTOR_UPDATE,
};
use crate::step::{SagaStep, StepOutcome};
use crate::validator::ConsistencyValidator;

/// Builds the ordered step list for updating one document.
pub fn steps(
    deps: &SagaDeps,
    index: &MappingIndex,
    config: &StoreConfig,
) -> Vec<Box<dyn SagaStep>> {
    vec![
        Box::new(LoadMappingStep {
            index: index.clone(),
            relational: deps.relational.clone(),
            timeout: config.step_timeout,
            compute_hash: true,
        }),
        Box::new(VectorUpdateStep {
            vector: deps.vector.clone(),
            chunk_size: config.chunk_size,
            timeout: config.step_timeout,
        }),
        Box::new(GraphUpdateStep {
            graph: deps.graph.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(RelationalUpdateStep {
            relational: deps.relational.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(FileStorageUpdateStep {
            file_storage: deps.file_storage.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(BindIdentityStep {
            identity: deps.identity.clone(),
            name: STEP_IDENTITY_REBIND,
        }),
        Box::new(FinalizeUpdateStep {
            relational: deps.relational.clone(),
            index: index.clone(),
            timeout: config.step_timeout,
        }),
    ]
}

/// Re-embeds the new content, or creates the embeddings if the document
/// never got any. Optional.
struct VectorUpdateStep {
    vector: Arc<dyn backends::VectorBackend>,
    chunk_size: usize,
    timeout: Option<Duration>,
}

impl VectorUpdateStep {
    fn created_fresh(ctx: &SagaContext) -> bool {
        ctx.mapping
            .as_ref()
            .is_some_and(|m| m.vector_id.is_none())
            && ctx.record_id(BackendKind::Vector).is_some()
    }
}

#[async_trait]
impl SagaStep for VectorUpdateStep {
    fn name(&self) -> &'static str {
        STEP_VECTOR_UPDATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();
        let has_existing = ctx.require_mapping()?.vector_id.is_some();
        let chunks = sagas::chunk_content(&ctx.content, self.chunk_size);

        let result = sagas::call_with_deadline(BackendKind::Vector, self.timeout, async {
            if has_existing {
                self.vector
                    .update(&document_id, &chunks, &ctx.metadata)
                    .await
            } else {
                self.vector
                    .create(&document_id, &chunks, &ctx.metadata)
                    .await
            }
        })
        .await;

        sagas::optional_with_id(ctx, BackendKind::Vector, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        if Self::created_fresh(ctx) {
            let document_id = ctx.require_document_id()?;
            self.vector.delete(document_id).await?;
            return Ok(());
        }
        if ctx.record_id(BackendKind::Vector).is_none() {
            return Ok(());
        }
        // Re-embed the prior content, best effort.
        if let Some(previous) = ctx.previous_row.clone() {
            let chunks = sagas::chunk_content(&previous.content, self.chunk_size);
            self.vector
                .update(&previous.document_id, &chunks, &previous.metadata)
                .await?;
        }
        Ok(())
    }
}

/// Replaces the graph node's properties, or creates the node if the
/// document never got one. Optional.
struct GraphUpdateStep {
    graph: Arc<dyn backends::GraphBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for GraphUpdateStep {
    fn name(&self) -> &'static str {
        STEP_GRAPH_UPDATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();
        let node_id = ctx.require_mapping()?.graph_id.clone();

        match node_id {
            Some(node_id) => {
                let result = sagas::call_with_deadline(
                    BackendKind::Graph,
                    self.timeout,
                    self.graph.update(&node_id, &ctx.metadata),
                )
                .await;
                sagas::optional_unit(ctx, BackendKind::Graph, Some(node_id), result)
            }
            None => {
                let result = sagas::call_with_deadline(
                    BackendKind::Graph,
                    self.timeout,
                    self.graph.create(&document_id, &ctx.metadata),
                )
                .await;
                sagas::optional_with_id(ctx, BackendKind::Graph, result)
            }
        }
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        let Some(node_id) = ctx.record_id(BackendKind::Graph).map(String::from) else {
            return Ok(());
        };
        let had_existing = ctx
            .mapping
            .as_ref()
            .is_some_and(|m| m.graph_id.is_some());

        if !had_existing {
            self.graph.delete(&node_id).await?;
        } else if let Some(previous) = &ctx.previous_row {
            self.graph.update(&node_id, &previous.metadata).await?;
        }
        Ok(())
    }
}

/// Replaces the system-of-record row. Mandatory; a missing row here
/// means the mapping and the relational store disagree, which aborts
/// the saga.
struct RelationalUpdateStep {
    relational: Arc<dyn backends::RelationalBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for RelationalUpdateStep {
    fn name(&self) -> &'static str {
        STEP_RELATIONAL_UPDATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let created_at = ctx
            .previous_row
            .as_ref()
            .map(|r| r.created_at)
            .unwrap_or(ctx.started_at);

        let row = DocumentRow {
            document_id: ctx.require_document_id()?.clone(),
            uuid: ctx.require_uuid()?,
            content: ctx.content.clone(),
            metadata: ctx.metadata.clone(),
            file_hash: ctx.require_file_hash()?.to_string(),
            identity_key: ctx.identity_key.clone(),
            created_at,
            updated_at: Utc::now(),
        };

        let result = sagas::call_with_deadline(
            BackendKind::Relational,
            self.timeout,
            self.relational.update(&row),
        )
        .await;

        sagas::mandatory_with_id(ctx, BackendKind::Relational, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        // Restore the captured prior row via the upsert.
        if let Some(previous) = &ctx.previous_row {
            self.relational.create(previous).await?;
        }
        Ok(())
    }
}

/// Overwrites the stored blob, or stores it fresh if the document never
/// got one. Optional.
struct FileStorageUpdateStep {
    file_storage: Arc<dyn backends::FileStorageBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for FileStorageUpdateStep {
    fn name(&self) -> &'static str {
        STEP_FILE_STORAGE_UPDATE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();
        let asset_id = ctx.require_mapping()?.file_storage_id.clone();

        match asset_id {
            Some(asset_id) => {
                let result = sagas::call_with_deadline(
                    BackendKind::FileStorage,
                    self.timeout,
                    self.file_storage.update(&asset_id, ctx.content.as_bytes()),
                )
                .await;
                sagas::optional_unit(ctx, BackendKind::FileStorage, Some(asset_id), result)
            }
            None => {
                let path = sagas::blob_path(&document_id);
                let result = sagas::call_with_deadline(
                    BackendKind::FileStorage,
                    self.timeout,
                    self.file_storage.create(
                        &document_id,
                        &path,
                        ctx.content.as_bytes(),
                        &ctx.metadata,
                    ),
                )
                .await;
                sagas::optional_with_id(ctx, BackendKind::FileStorage, result)
            }
        }
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        let Some(asset_id) = ctx.record_id(BackendKind::FileStorage).map(String::from) else {
            return Ok(());
        };
        let had_existing = ctx
            .mapping
            .as_ref()
            .is_some_and(|m| m.file_storage_id.is_some());

        if !had_existing {
            self.file_storage.delete(&asset_id).await?;
        } else if let Some(previous) = &ctx.previous_row {
            self.file_storage
                .update(&asset_id, previous.content.as_bytes())
                .await?;
        }
        Ok(())
    }
}

/// Terminal step: read-back, validation, and mapping refresh. Record
/// IDs from this run replace the mapping's where present; a skipped
/// backend keeps its previous binding.
struct FinalizeUpdateStep {
    relational: Arc<dyn backends::RelationalBackend>,
    index: MappingIndex,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for FinalizeUpdateStep {
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

        let mut mapping = ctx.require_mapping()?.clone();
        if let Some(id) = ctx.record_id(BackendKind::Vector) {
            mapping.vector_id = Some(id.to_string());
        }
        if let Some(id) = ctx.record_id(BackendKind::Graph) {
            mapping.graph_id = Some(id.to_string());
        }
        if let Some(id) = ctx.record_id(BackendKind::Relational) {
            mapping.relational_id = Some(id.to_string());
        }
        if let Some(id) = ctx.record_id(BackendKind::FileStorage) {
            mapping.file_storage_id = Some(id.to_string());
        }
        mapping.identity_key = ctx.identity_key.clone();
        mapping.updated_at = Utc::now();

        self.index.put(mapping.clone()).await;
        ctx.mapping = Some(mapping);

        Ok(StepOutcome::Completed)
    }
}
