//! Shared types for the polyglot document persistence layer.
//!
//! One logical document is stored across four heterogeneous backends and
//! tied together by a canonical UUID. This crate holds the identifier
//! newtypes and the content digest helper that every other crate agrees on.

pub mod hash;
pub mod types;

pub use hash::sha256_hex;
pub use types::{DocumentId, DocumentUuid, IdentityKey, Metadata};
