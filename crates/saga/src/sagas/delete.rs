//! The document delete saga.
//!
//! Walks the same backend order as create, deleting by the record IDs
//! held in the mapping. A backend the mapping never bound is a
//! successful no-op. Compensations re-create records from the
//! relational row captured at step 1, so a failed delete converges back
//! to a present document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backends::BackendKind;

use crate::config::StoreConfig;
use crate::context::{BackendOutcome, SagaContext};
use crate::error::SagaError;
use crate::mapping::MappingIndex;
use crate::sagas::{
    self, LoadMappingStep, SagaDeps, STEP_FILE_STORAGE_DELETE, STEP_FINALIZE_REMOVAL,
    STEP_GRAPH_DELETE, STEP_IDENTITY_RELEASE, STEP_RELATIONAL_DELETE, STEP_VECTOR_DELETE,
};
use crate::step::{SagaStep, StepOutcome};
use crate::validator::ConsistencyValidator;

/// Builds the ordered step list for deleting one document.
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
            compute_hash: false,
        }),
        Box::new(VectorDeleteStep {
            vector: deps.vector.clone(),
            chunk_size: config.chunk_size,
            timeout: config.step_timeout,
        }),
        Box::new(GraphDeleteStep {
            graph: deps.graph.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(RelationalDeleteStep {
            relational: deps.relational.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(FileStorageDeleteStep {
            file_storage: deps.file_storage.clone(),
            timeout: config.step_timeout,
        }),
        Box::new(IdentityReleaseStep {
            identity: deps.identity.clone(),
        }),
        Box::new(FinalizeRemovalStep {
            relational: deps.relational.clone(),
            index: index.clone(),
            timeout: config.step_timeout,
        }),
    ]
}

/// Removes the document's embeddings. Optional; nothing bound is a
/// successful no-op.
struct VectorDeleteStep {
    vector: Arc<dyn backends::VectorBackend>,
    chunk_size: usize,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for VectorDeleteStep {
    fn name(&self) -> &'static str {
        STEP_VECTOR_DELETE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();
        if ctx.require_mapping()?.vector_id.is_none() {
            ctx.record_outcome(BackendKind::Vector, BackendOutcome::succeeded(None));
            return Ok(StepOutcome::Completed);
        }

        let result = sagas::call_with_deadline(
            BackendKind::Vector,
            self.timeout,
            self.vector.delete(&document_id),
        )
        .await;

        sagas::optional_unit(ctx, BackendKind::Vector, None, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        let deleted = ctx
            .outcome(BackendKind::Vector)
            .is_some_and(|o| o.success && !o.skipped)
            && ctx.mapping.as_ref().is_some_and(|m| m.vector_id.is_some());
        if !deleted {
            return Ok(());
        }
        if let Some(previous) = ctx.previous_row.clone() {
            let chunks = sagas::chunk_content(&previous.content, self.chunk_size);
            let record_id = self
                .vector
                .create(&previous.document_id, &chunks, &previous.metadata)
                .await?;
            if let Some(mapping) = ctx.mapping.as_mut() {
                mapping.vector_id = Some(record_id);
            }
        }
        Ok(())
    }
}

/// Removes the graph node. Optional.
struct GraphDeleteStep {
    graph: Arc<dyn backends::GraphBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for GraphDeleteStep {
    fn name(&self) -> &'static str {
        STEP_GRAPH_DELETE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let Some(node_id) = ctx.require_mapping()?.graph_id.clone() else {
            ctx.record_outcome(BackendKind::Graph, BackendOutcome::succeeded(None));
            return Ok(StepOutcome::Completed);
        };

        let result = sagas::call_with_deadline(
            BackendKind::Graph,
            self.timeout,
            self.graph.delete(&node_id),
        )
        .await;

        sagas::optional_unit(ctx, BackendKind::Graph, None, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        let deleted = ctx
            .outcome(BackendKind::Graph)
            .is_some_and(|o| o.success && !o.skipped)
            && ctx.mapping.as_ref().is_some_and(|m| m.graph_id.is_some());
        if !deleted {
            return Ok(());
        }
        if let Some(previous) = ctx.previous_row.clone() {
            let node_id = self
                .graph
                .create(&previous.document_id, &previous.metadata)
                .await?;
            if let Some(mapping) = ctx.mapping.as_mut() {
                mapping.graph_id = Some(node_id);
            }
        }
        Ok(())
    }
}

/// Removes the system-of-record row. Mandatory.
struct RelationalDeleteStep {
    relational: Arc<dyn backends::RelationalBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for RelationalDeleteStep {
    fn name(&self) -> &'static str {
        STEP_RELATIONAL_DELETE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();

        let result = sagas::call_with_deadline(
            BackendKind::Relational,
            self.timeout,
            self.relational.delete(&document_id),
        )
        .await;

        sagas::mandatory_unit(ctx, BackendKind::Relational, None, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        if let Some(previous) = ctx.previous_row.clone() {
            let row_id = self.relational.create(&previous).await?;
            if let Some(mapping) = ctx.mapping.as_mut() {
                mapping.relational_id = Some(row_id);
            }
        }
        Ok(())
    }
}

/// Removes the stored blob. Optional.
struct FileStorageDeleteStep {
    file_storage: Arc<dyn backends::FileStorageBackend>,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for FileStorageDeleteStep {
    fn name(&self) -> &'static str {
        STEP_FILE_STORAGE_DELETE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let Some(asset_id) = ctx.require_mapping()?.file_storage_id.clone() else {
            ctx.record_outcome(BackendKind::FileStorage, BackendOutcome::succeeded(None));
            return Ok(StepOutcome::Completed);
        };

        let result = sagas::call_with_deadline(
            BackendKind::FileStorage,
            self.timeout,
            self.file_storage.delete(&asset_id),
        )
        .await;

        sagas::optional_unit(ctx, BackendKind::FileStorage, None, result)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        let deleted = ctx
            .outcome(BackendKind::FileStorage)
            .is_some_and(|o| o.success && !o.skipped)
            && ctx
                .mapping
                .as_ref()
                .is_some_and(|m| m.file_storage_id.is_some());
        if !deleted {
            return Ok(());
        }
        if let Some(previous) = ctx.previous_row.clone() {
            let path = sagas::blob_path(&previous.document_id);
            let asset_id = self
                .file_storage
                .create(
                    &previous.document_id,
                    &path,
                    previous.content.as_bytes(),
                    &previous.metadata,
                )
                .await?;
            if let Some(mapping) = ctx.mapping.as_mut() {
                mapping.file_storage_id = Some(asset_id);
            }
        }
        Ok(())
    }
}

/// Tombstones the canonical UUID. Non-critical: the backends are
/// already clean, so a release failure is a warning. The UUID is never
/// recycled, so there is nothing to undo on rollback.
struct IdentityReleaseStep {
    identity: Arc<dyn identity::IdentityService>,
}

#[async_trait]
impl SagaStep for IdentityReleaseStep {
    fn name(&self) -> &'static str {
        STEP_IDENTITY_RELEASE
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let uuid = ctx.require_uuid()?;
        self.identity
            .release_uuid(uuid)
            .await
            .map_err(|e| SagaError::IdentityReleaseFailed {
                reason: e.to_string(),
            })?;
        Ok(StepOutcome::Completed)
    }
}

/// Terminal step: verifies the relational row is gone and drops the
/// mapping entry.
struct FinalizeRemovalStep {
    relational: Arc<dyn backends::RelationalBackend>,
    index: MappingIndex,
    timeout: Option<Duration>,
}

#[async_trait]
impl SagaStep for FinalizeRemovalStep {
    fn name(&self) -> &'static str {
        STEP_FINALIZE_REMOVAL
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

        let result = ConsistencyValidator::validate_removal(ctx);
        let summary = result.failure_summary();
        let valid = result.overall_valid;
        ctx.validation = Some(result);

        if !valid {
            return Err(SagaError::ValidationFailed { reason: summary });
        }

        self.index.remove(&document_id).await;
        ctx.mapping = None;

        Ok(StepOutcome::Completed)
    }
}
