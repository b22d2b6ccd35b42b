//! Document saga orchestrator for polyglot persistence.
//!
//! One logical document lives in four heterogeneous backends at once
//! (vector, graph, relational, file storage). No cross-backend ACID
//! transaction exists, so this crate fabricates the guarantee itself:
//! every operation is a saga of compensable steps, executed in a fixed
//! order and rolled back in strict reverse order when a step fails.
//!
//! The create saga runs these steps:
//! 1. security_and_identity: hash content, mint/register the UUID
//! 2. vector_create (optional, skip policy)
//! 3. graph_create (optional, skip policy)
//! 4. relational_create (mandatory, system of record)
//! 5. file_storage_create (optional, skip policy)
//! 6. identity_mapping (non-critical)
//! 7. validation_and_finalize: consistency check, mapping index write
//!
//! Update and delete sagas follow the same shape, loading the existing
//! mapping instead of minting identity.

pub mod config;
pub mod context;
pub mod error;
pub mod mapping;
pub mod runner;
pub mod sagas;
pub mod service;
pub mod state;
pub mod step;
pub mod validator;

pub use config::StoreConfig;
pub use context::{BackendOutcome, SagaContext};
pub use error::{SagaError, Severity};
pub use mapping::{DocumentMapping, MappingIndex};
pub use runner::{SagaReport, SagaRunner};
pub use service::{
    CreateDocumentRequest, DocumentOperationResult, DocumentStore, SagaDeps,
    UpdateDocumentRequest,
};
pub use state::SagaState;
pub use step::{SagaStep, StepOutcome};
pub use validator::{ConsistencyValidator, ValidationCheck, ValidationResult};
