//! Saga builders and the policies they share.
//!
//! Each submodule assembles the ordered step list for one document
//! operation. The helpers here implement the two outcome policies:
//!
//! - **optional** (vector, graph, file storage): an unavailable backend
//!   (or a timeout, for exactly these steps) records a skipped outcome
//!   plus one warning and lets the saga continue; every other error is
//!   hard.
//! - **mandatory** (relational): any error is hard.

pub mod create;
pub mod delete;
pub mod update;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backends::{BackendError, BackendKind, RelationalBackend};
use identity::BackendBindings;

use crate::context::{BackendOutcome, SagaContext};
use crate::error::SagaError;
use crate::mapping::MappingIndex;
use crate::step::{SagaStep, StepOutcome};

/// Saga type identifiers, used in logs and metrics labels.
pub const CREATE_SAGA: &str = "DocumentCreate";
pub const UPDATE_SAGA: &str = "DocumentUpdate";
pub const DELETE_SAGA: &str = "DocumentDelete";

// Create saga step names.
pub const STEP_SECURITY_AND_IDENTITY: &str = "security_and_identity";
pub const STEP_VECTOR_CREATE: &str = "vector_create";
pub const STEP_GRAPH_CREATE: &str = "graph_create";
pub const STEP_RELATIONAL_CREATE: &str = "relational_create";
pub const STEP_FILE_STORAGE_CREATE: &str = "file_storage_create";
pub const STEP_IDENTITY_MAPPING: &str = "identity_mapping";
pub const STEP_VALIDATION_AND_FINALIZE: &str = "validation_and_finalize";

// Update saga step names (step 1 and the terminal step differ).
pub const STEP_LOAD_MAPPING: &str = "load_mapping";
pub const STEP_VECTOR_UPDATE: &str = "vector_update";
pub const STEP_GRAPH_UPDATE: &str = "graph_update";
pub const STEP_RELATIONAL_UPDATE: &str = "relational_update";
pub const STEP_FILE_STORAGE_UPDATE: &str = "file_storage_update";
pub const STEP_IDENTITY_REBIND: &str = "identity_rebind";

// Delete saga step names.
pub const STEP_VECTOR_DELETE: &str = "vector_delete";
pub const STEP_GRAPH_DELETE: &str = "graph_delete";
pub const STEP_RELATIONAL_DELETE: &str = "relational_delete";
pub const STEP_FILE_STORAGE_DELETE: &str = "file_storage_delete";
pub const STEP_IDENTITY_RELEASE: &str = "identity_release";
pub const STEP_FINALIZE_REMOVAL: &str = "finalize_removal";

/// The backend ports and identity service a saga operates on.
///
/// Injected at construction time; the orchestrator holds no ambient
/// global state.
#[derive(Clone)]
pub struct SagaDeps {
    pub vector: Arc<dyn backends::VectorBackend>,
    pub graph: Arc<dyn backends::GraphBackend>,
    pub relational: Arc<dyn RelationalBackend>,
    pub file_storage: Arc<dyn backends::FileStorageBackend>,
    pub identity: Arc<dyn identity::IdentityService>,
}

/// Wraps a backend call in the configured deadline.
pub(crate) async fn call_with_deadline<T, F>(
    kind: BackendKind,
    deadline: Option<Duration>,
    fut: F,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match deadline {
        None => fut.await,
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                backend: kind,
                timeout_ms: d.as_millis() as u64,
            }),
        },
    }
}

/// Unavailability, and for optional backends only a timeout, makes a
/// step skippable instead of failed.
fn skippable(err: &BackendError) -> bool {
    err.is_unavailable() || matches!(err, BackendError::Timeout { .. })
}

/// Optional-backend policy for calls returning a record ID.
pub(crate) fn optional_with_id(
    ctx: &mut SagaContext,
    kind: BackendKind,
    result: Result<String, BackendError>,
) -> Result<StepOutcome, SagaError> {
    match result {
        Ok(record_id) => {
            ctx.record_outcome(kind, BackendOutcome::succeeded(Some(record_id)));
            Ok(StepOutcome::Completed)
        }
        Err(err) if skippable(&err) => {
            ctx.record_outcome(kind, BackendOutcome::skipped(err.to_string()));
            Ok(StepOutcome::Skipped)
        }
        Err(err) => {
            ctx.record_outcome(kind, BackendOutcome::failed(err.to_string()));
            Err(err.into())
        }
    }
}

/// Optional-backend policy for calls that return no new ID; the record
/// ID already known for this backend (if any) is carried through.
pub(crate) fn optional_unit(
    ctx: &mut SagaContext,
    kind: BackendKind,
    record_id: Option<String>,
    result: Result<(), BackendError>,
) -> Result<StepOutcome, SagaError> {
    match result {
        Ok(()) => {
            ctx.record_outcome(kind, BackendOutcome::succeeded(record_id));
            Ok(StepOutcome::Completed)
        }
        Err(err) if skippable(&err) => {
            ctx.record_outcome(kind, BackendOutcome::skipped(err.to_string()));
            Ok(StepOutcome::Skipped)
        }
        Err(err) => {
            ctx.record_outcome(kind, BackendOutcome::failed(err.to_string()));
            Err(err.into())
        }
    }
}

/// Mandatory-backend policy: every error aborts the saga.
pub(crate) fn mandatory_with_id(
    ctx: &mut SagaContext,
    kind: BackendKind,
    result: Result<String, BackendError>,
) -> Result<StepOutcome, SagaError> {
    match result {
        Ok(record_id) => {
            ctx.record_outcome(kind, BackendOutcome::succeeded(Some(record_id)));
            Ok(StepOutcome::Completed)
        }
        Err(err) => {
            ctx.record_outcome(kind, BackendOutcome::failed(err.to_string()));
            Err(err.into())
        }
    }
}

/// Mandatory-backend policy for calls that return no new ID.
pub(crate) fn mandatory_unit(
    ctx: &mut SagaContext,
    kind: BackendKind,
    record_id: Option<String>,
    result: Result<(), BackendError>,
) -> Result<StepOutcome, SagaError> {
    match result {
        Ok(()) => {
            ctx.record_outcome(kind, BackendOutcome::succeeded(record_id));
            Ok(StepOutcome::Completed)
        }
        Err(err) => {
            ctx.record_outcome(kind, BackendOutcome::failed(err.to_string()));
            Err(err.into())
        }
    }
}

/// Splits content into fixed-size chunks on character boundaries.
pub(crate) fn chunk_content(content: &str, chunk_size: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        current.push(ch);
        if current.chars().count() >= size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Canonical blob path for a document's raw content.
pub(crate) fn blob_path(document_id: &common::DocumentId) -> String {
    format!("documents/{document_id}/content.bin")
}

/// Collects the record IDs accumulated in the context into a binding.
pub(crate) fn bindings_from(ctx: &SagaContext) -> BackendBindings {
    BackendBindings {
        relational_id: ctx.record_id(BackendKind::Relational).map(String::from),
        graph_id: ctx.record_id(BackendKind::Graph).map(String::from),
        vector_id: ctx.record_id(BackendKind::Vector).map(String::from),
        file_storage_id: ctx.record_id(BackendKind::FileStorage).map(String::from),
    }
}

/// Step 1 of the update and delete sagas: loads the mapping entry,
/// captures the prior relational row for rollback, and (for updates)
/// computes the new content hash.
pub(crate) struct LoadMappingStep {
    pub(crate) index: MappingIndex,
    pub(crate) relational: Arc<dyn RelationalBackend>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) compute_hash: bool,
}

#[async_trait]
impl SagaStep for LoadMappingStep {
    fn name(&self) -> &'static str {
        STEP_LOAD_MAPPING
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let document_id = ctx.require_document_id()?.clone();

        let mapping = self
            .index
            .get(&document_id)
            .await
            .ok_or_else(|| SagaError::MappingNotFound(document_id.clone()))?;

        ctx.uuid = Some(mapping.uuid);
        if ctx.identity_key.is_none() {
            ctx.identity_key = mapping.identity_key.clone();
        }

        ctx.previous_row = call_with_deadline(
            BackendKind::Relational,
            self.timeout,
            self.relational.get(&document_id),
        )
        .await?;

        if self.compute_hash {
            ctx.file_hash = Some(common::sha256_hex(ctx.content.as_bytes()));
        }

        ctx.mapping = Some(mapping);
        Ok(StepOutcome::Completed)
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
        // Compensations of later steps may have re-created records under
        // freshly minted IDs; persist the refreshed mapping so a retried
        // operation targets those records and not the stale ones.
        if let Some(mapping) = ctx.mapping.take() {
            self.index.put(mapping).await;
        }
        ctx.uuid = None;
        ctx.file_hash = None;
        ctx.previous_row = None;
        Ok(())
    }
}

/// Binds the record IDs collected in the context to the canonical UUID.
///
/// Non-critical on failure: the document already exists in the system
/// of record, so a binding failure is a warning, never an abort. The
/// binding itself is additive and is not rolled back.
pub(crate) struct BindIdentityStep {
    pub(crate) identity: Arc<dyn identity::IdentityService>,
    pub(crate) name: &'static str,
}

#[async_trait]
impl SagaStep for BindIdentityStep {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
        let uuid = ctx.require_uuid()?;
        let bindings = bindings_from(ctx);

        self.identity
            .bind_database_ids(uuid, bindings)
            .await
            .map_err(|e| SagaError::IdentityBindingFailed {
                reason: e.to_string(),
            })?;

        Ok(StepOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_respects_size_and_keeps_remainder() {
        let chunks = chunk_content("abcdefgh", 3);
        assert_eq!(chunks, vec!["abc", "def", "gh"]);
    }

    #[test]
    fn chunking_empty_content_yields_no_chunks() {
        assert!(chunk_content("", 100).is_empty());
    }

    #[test]
    fn chunking_handles_multibyte_characters() {
        let chunks = chunk_content("äöüß", 2);
        assert_eq!(chunks, vec!["äö", "üß"]);
    }

    #[test]
    fn blob_path_is_canonical() {
        let id = common::DocumentId::new("doc-1");
        assert_eq!(blob_path(&id), "documents/doc-1/content.bin");
    }

    #[tokio::test]
    async fn deadline_converts_to_timeout_error() {
        let result: Result<(), BackendError> = call_with_deadline(
            BackendKind::Vector,
            Some(Duration::from_millis(5)),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        assert!(matches!(result, Err(BackendError::Timeout { .. })));
    }

    #[tokio::test]
    async fn no_deadline_passes_through() {
        let result = call_with_deadline(BackendKind::Vector, None, async {
            Ok::<_, BackendError>("vec-1".to_string())
        })
        .await;
        assert_eq!(result.unwrap(), "vec-1");
    }
}
