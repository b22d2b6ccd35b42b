//! Per-run execution context shared by the steps of one saga.

use std::collections::HashMap;

use backends::{BackendKind, DocumentRow};
use chrono::{DateTime, Utc};
use common::{DocumentId, DocumentUuid, IdentityKey, Metadata};
use serde::Serialize;

use crate::error::SagaError;
use crate::mapping::DocumentMapping;
use crate::state::SagaState;
use crate::validator::ValidationResult;

/// The outcome of one backend operation within a saga.
///
/// Invariant: `skipped` implies `success`; a skipped backend never
/// fails the overall saga. The constructors enforce this.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendOutcome {
    pub success: bool,
    pub skipped: bool,
    pub record_id: Option<String>,
    pub error: Option<String>,
    pub warning: Option<String>,
}

impl BackendOutcome {
    /// A completed operation, optionally carrying the backend record ID.
    pub fn succeeded(record_id: Option<String>) -> Self {
        Self {
            success: true,
            skipped: false,
            record_id,
            error: None,
            warning: None,
        }
    }

    /// An operation skipped because the backend is optional and
    /// unavailable. Counts as success, with a warning.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: true,
            record_id: None,
            error: None,
            warning: Some(reason.into()),
        }
    }

    /// A hard failure.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: false,
            record_id: None,
            error: Some(error.into()),
            warning: None,
        }
    }
}

/// Mutable state threaded through one saga run.
///
/// Each step reads the fields populated by its predecessors and writes
/// the ones it owns. Created at saga start, discarded at saga end;
/// never persisted and never shared across concurrent operations.
#[derive(Debug, Default)]
pub struct SagaContext {
    /// Stable external identifier. For creates without an explicit ID,
    /// the security_and_identity step fills this in.
    pub document_id: Option<DocumentId>,
    /// Canonical identity, minted or loaded by step 1.
    pub uuid: Option<DocumentUuid>,
    /// Raw document content for this operation (empty for deletes).
    pub content: String,
    pub metadata: Metadata,
    /// Business key, taken from metadata or the loaded mapping.
    pub identity_key: Option<IdentityKey>,
    /// SHA-256 hex digest of `content`, computed by step 1.
    pub file_hash: Option<String>,
    pub started_at: DateTime<Utc>,
    /// Relational row captured before an update/delete, for rollback.
    pub previous_row: Option<DocumentRow>,
    /// Mapping entry loaded (update/delete) or built (create).
    pub mapping: Option<DocumentMapping>,
    /// `file_hash` read back from the relational row during finalize.
    pub persisted_hash: Option<String>,
    /// Verdict of the consistency validator, set by the terminal step.
    pub validation: Option<ValidationResult>,
    /// Lifecycle position, driven by the runner: `Running` while forward
    /// steps execute, `Compensating` during rollback, then terminal.
    pub state: SagaState,
    backend_results: HashMap<BackendKind, BackendOutcome>,
    warnings: Vec<String>,
    compensated_steps: Vec<String>,
}

impl SagaContext {
    /// Context for a create saga.
    pub fn for_create(
        document_id: Option<DocumentId>,
        content: String,
        metadata: Metadata,
    ) -> Self {
        Self {
            document_id,
            content,
            metadata,
            started_at: Utc::now(),
            ..Default::default()
        }
    }

    /// Context for an update or delete saga over an existing document.
    pub fn for_existing(document_id: DocumentId, content: String, metadata: Metadata) -> Self {
        Self {
            document_id: Some(document_id),
            content,
            metadata,
            started_at: Utc::now(),
            ..Default::default()
        }
    }

    pub fn require_document_id(&self) -> Result<&DocumentId, SagaError> {
        self.document_id
            .as_ref()
            .ok_or(SagaError::MissingContext {
                field: "document_id",
            })
    }

    pub fn require_uuid(&self) -> Result<DocumentUuid, SagaError> {
        self.uuid.ok_or(SagaError::MissingContext { field: "uuid" })
    }

    pub fn require_file_hash(&self) -> Result<&str, SagaError> {
        self.file_hash
            .as_deref()
            .ok_or(SagaError::MissingContext { field: "file_hash" })
    }

    pub fn require_mapping(&self) -> Result<&DocumentMapping, SagaError> {
        self.mapping
            .as_ref()
            .ok_or(SagaError::MissingContext { field: "mapping" })
    }

    /// Records the outcome of a backend operation, folding its warning
    /// into the run's warning list.
    pub fn record_outcome(&mut self, kind: BackendKind, outcome: BackendOutcome) {
        if let Some(warning) = &outcome.warning {
            self.warnings.push(format!("{kind}: {warning}"));
        }
        self.backend_results.insert(kind, outcome);
    }

    pub fn outcome(&self, kind: BackendKind) -> Option<&BackendOutcome> {
        self.backend_results.get(&kind)
    }

    /// Record ID a backend reported, if the operation succeeded with one.
    pub fn record_id(&self, kind: BackendKind) -> Option<&str> {
        self.backend_results
            .get(&kind)
            .and_then(|o| o.record_id.as_deref())
    }

    pub fn is_skipped(&self, kind: BackendKind) -> bool {
        self.backend_results
            .get(&kind)
            .is_some_and(|o| o.skipped)
    }

    pub fn backend_results(&self) -> &HashMap<BackendKind, BackendOutcome> {
        &self.backend_results
    }

    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Marks a step's compensation as performed.
    pub fn mark_compensated(&mut self, step: &str) {
        self.compensated_steps.push(step.to_string());
    }

    pub fn compensated_steps(&self) -> &[String] {
        &self.compensated_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_outcome_counts_as_success() {
        let outcome = BackendOutcome::skipped("vector backend not configured");
        assert!(outcome.success);
        assert!(outcome.skipped);
        assert!(outcome.record_id.is_none());
        assert!(outcome.warning.is_some());
    }

    #[test]
    fn failed_outcome_carries_error() {
        let outcome = BackendOutcome::failed("write rejected");
        assert!(!outcome.success);
        assert!(!outcome.skipped);
        assert_eq!(outcome.error.as_deref(), Some("write rejected"));
    }

    #[test]
    fn recording_an_outcome_collects_its_warning() {
        let mut ctx = SagaContext::for_create(None, "x".into(), Metadata::new());
        ctx.record_outcome(
            BackendKind::Vector,
            BackendOutcome::skipped("not configured"),
        );

        assert!(ctx.is_skipped(BackendKind::Vector));
        assert_eq!(ctx.warnings().len(), 1);
        assert!(ctx.warnings()[0].starts_with("vector:"));
    }

    #[test]
    fn require_accessors_report_missing_fields() {
        let ctx = SagaContext::for_create(None, String::new(), Metadata::new());
        assert!(matches!(
            ctx.require_document_id(),
            Err(SagaError::MissingContext {
                field: "document_id"
            })
        ));
        assert!(matches!(
            ctx.require_uuid(),
            Err(SagaError::MissingContext { field: "uuid" })
        ));
    }

    #[test]
    fn compensated_steps_preserve_order() {
        let mut ctx = SagaContext::default();
        ctx.mark_compensated("file_storage_create");
        ctx.mark_compensated("relational_create");
        assert_eq!(
            ctx.compensated_steps(),
            &["file_storage_create", "relational_create"]
        );
    }
}
