//! Identity service error types.

use common::DocumentUuid;
use thiserror::Error;

/// Errors that can occur during identity operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    /// UUID registration was rejected.
    #[error("registration failed for {uuid}: {reason}")]
    RegistrationFailed { uuid: DocumentUuid, reason: String },

    /// Binding backend record IDs to a UUID failed.
    ///
    /// Non-critical from the orchestrator's point of view: the document
    /// already exists in the system of record.
    #[error("binding database ids to {uuid} failed: {reason}")]
    BindingFailed { uuid: DocumentUuid, reason: String },

    /// The UUID is not registered.
    #[error("unknown uuid: {0}")]
    UnknownUuid(DocumentUuid),
}
