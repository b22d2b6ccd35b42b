//! Identity-mapping service for the polyglot persistence layer.
//!
//! Ties the per-backend record IDs of one logical document to a single
//! canonical UUID, and resolves external business keys (identity keys)
//! to that UUID. UUIDs are globally unique and never recycled; bindings
//! are additive.

pub mod error;
pub mod service;

pub use error::IdentityError;
pub use service::{BackendBindings, IdentityRecord, IdentityService, InMemoryIdentityService};
