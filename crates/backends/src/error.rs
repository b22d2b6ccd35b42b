//! Typed backend error taxonomy.

use thiserror::Error;

use crate::kind::BackendKind;

/// Errors returned by backend ports.
///
/// `Unavailable` is an explicit variant so the orchestrator never has to
/// pattern-match error message strings to apply the skip policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not configured or not reachable.
    #[error("{backend} backend is not configured or unavailable")]
    Unavailable { backend: BackendKind },

    /// Backend is reachable but the operation itself failed.
    #[error("{backend} operation failed: {reason}")]
    OperationFailed { backend: BackendKind, reason: String },

    /// The addressed record does not exist.
    #[error("record not found in {backend} backend: {id}")]
    NotFound { backend: BackendKind, id: String },

    /// The call did not complete within its deadline.
    #[error("{backend} operation timed out after {timeout_ms}ms")]
    Timeout { backend: BackendKind, timeout_ms: u64 },
}

impl BackendError {
    /// Shorthand for an operation failure.
    pub fn failed(backend: BackendKind, reason: impl Into<String>) -> Self {
        BackendError::OperationFailed {
            backend,
            reason: reason.into(),
        }
    }

    /// Returns the backend that produced this error.
    pub fn backend(&self) -> BackendKind {
        match self {
            BackendError::Unavailable { backend }
            | BackendError::OperationFailed { backend, .. }
            | BackendError::NotFound { backend, .. }
            | BackendError::Timeout { backend, .. } => *backend,
        }
    }

    /// Returns true if the backend signalled that it is not configured
    /// or not reachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_recognized() {
        let err = BackendError::Unavailable {
            backend: BackendKind::Vector,
        };
        assert!(err.is_unavailable());
        assert_eq!(err.backend(), BackendKind::Vector);
    }

    #[test]
    fn operation_failure_is_not_unavailable() {
        let err = BackendError::failed(BackendKind::Relational, "constraint violation");
        assert!(!err.is_unavailable());
        assert_eq!(err.backend(), BackendKind::Relational);
        assert_eq!(
            err.to_string(),
            "relational operation failed: constraint violation"
        );
    }

    #[test]
    fn timeout_carries_deadline() {
        let err = BackendError::Timeout {
            backend: BackendKind::Graph,
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "graph operation timed out after 250ms");
    }
}
