//! Saga error taxonomy.
//!
//! Errors carry an explicit severity so the runner can tell which
//! failures abort a saga and which are downgraded to warnings.

use backends::{BackendError, BackendKind};
use common::DocumentId;
use thiserror::Error;

/// How the runner treats a step error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts remaining steps and triggers reverse-order compensation.
    Hard,
    /// Recorded as a warning; the saga continues and can still succeed.
    NonCritical,
}

/// Errors that can occur during a document saga.
#[derive(Debug, Clone, Error)]
pub enum SagaError {
    /// A backend is not configured or reachable. Hard for the mandatory
    /// relational backend; optional backends never surface this (the
    /// skip policy converts it into a skipped outcome).
    #[error("{backend} backend unavailable")]
    BackendUnavailable { backend: BackendKind },

    /// A backend was reachable but the operation failed.
    #[error("{backend} operation failed: {reason}")]
    BackendOperationFailed { backend: BackendKind, reason: String },

    /// The post-write consistency check failed.
    #[error("consistency validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// A rollback action failed. Never the primary error of a saga.
    #[error("compensation for step '{step}' failed: {reason}")]
    CompensationFailed { step: String, reason: String },

    /// The identity service rejected minting or registration.
    #[error("identity service error: {reason}")]
    Identity { reason: String },

    /// Binding backend record IDs to the UUID failed.
    #[error("identity binding failed: {reason}")]
    IdentityBindingFailed { reason: String },

    /// Releasing the UUID registration on delete failed.
    #[error("identity release failed: {reason}")]
    IdentityReleaseFailed { reason: String },

    /// No mapping entry exists for the document.
    #[error("no mapping entry for document '{0}'")]
    MappingNotFound(DocumentId),

    /// A step ran before the context field it depends on was populated.
    #[error("saga context is missing required field '{field}'")]
    MissingContext { field: &'static str },

    /// Snapshotting or loading the mapping index failed.
    #[error("mapping index persistence failed: {reason}")]
    MappingPersistence { reason: String },
}

impl SagaError {
    /// Classifies the error for the runner.
    pub fn severity(&self) -> Severity {
        match self {
            SagaError::CompensationFailed { .. }
            | SagaError::IdentityBindingFailed { .. }
            | SagaError::IdentityReleaseFailed { .. } => Severity::NonCritical,
            _ => Severity::Hard,
        }
    }
}

impl From<BackendError> for SagaError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { backend } => SagaError::BackendUnavailable { backend },
            BackendError::Timeout { backend, timeout_ms } => SagaError::BackendOperationFailed {
                backend,
                reason: format!("timed out after {timeout_ms}ms"),
            },
            BackendError::NotFound { backend, id } => SagaError::BackendOperationFailed {
                backend,
                reason: format!("record not found: {id}"),
            },
            BackendError::OperationFailed { backend, reason } => {
                SagaError::BackendOperationFailed { backend, reason }
            }
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_and_compensation_failures_are_non_critical() {
        let binding = SagaError::IdentityBindingFailed {
            reason: "x".into(),
        };
        let comp = SagaError::CompensationFailed {
            step: "vector_create".into(),
            reason: "x".into(),
        };
        assert_eq!(binding.severity(), Severity::NonCritical);
        assert_eq!(comp.severity(), Severity::NonCritical);
    }

    #[test]
    fn backend_failures_are_hard() {
        let err: SagaError = BackendError::failed(BackendKind::Relational, "boom").into();
        assert_eq!(err.severity(), Severity::Hard);
        assert!(matches!(err, SagaError::BackendOperationFailed { .. }));
    }

    #[test]
    fn unavailable_maps_to_typed_variant() {
        let err: SagaError = BackendError::Unavailable {
            backend: BackendKind::Vector,
        }
        .into();
        assert!(matches!(
            err,
            SagaError::BackendUnavailable {
                backend: BackendKind::Vector
            }
        ));
    }

    #[test]
    fn timeout_becomes_operation_failure() {
        let err: SagaError = BackendError::Timeout {
            backend: BackendKind::Relational,
            timeout_ms: 100,
        }
        .into();
        match err {
            SagaError::BackendOperationFailed { reason, .. } => {
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
