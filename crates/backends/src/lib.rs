//! Backend ports for the polyglot persistence layer.
//!
//! Each of the four heterogeneous storage systems (vector, graph,
//! relational, file storage) is consumed through a narrow async trait.
//! Real drivers live outside this workspace; the in-memory
//! implementations here exist for the orchestrator's tests and expose
//! fault toggles (unavailability, write failures, stored-hash tampering)
//! plus inspection hooks.
//!
//! Every port method returns a typed [`BackendError`], so the
//! orchestrator distinguishes "backend unavailable" from "operation
//! failed" without string matching.

pub mod error;
pub mod file_storage;
pub mod graph;
pub mod kind;
pub mod relational;
pub mod vector;

pub use error::BackendError;
pub use file_storage::{FileStorageBackend, InMemoryFileStorage, StoredAsset};
pub use graph::{GraphBackend, InMemoryGraphBackend};
pub use kind::BackendKind;
pub use relational::{DocumentRow, InMemoryRelationalBackend, RelationalBackend};
pub use vector::{InMemoryVectorBackend, VectorBackend};
