use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open key/value metadata attached to a document.
///
/// A `BTreeMap` keeps serialization order stable, which matters when
/// metadata feeds into digests or test fixtures.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Stable external identifier of a logical document.
///
/// Wraps a string to prevent mixing document ids up with backend record
/// ids, which are also strings but scoped to a single backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document ID from a caller-supplied string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Formats the canonical document ID for a freshly minted UUID.
    ///
    /// Used when a create request carries no explicit ID.
    pub fn derived_from(uuid: &DocumentUuid) -> Self {
        let simple = uuid.as_uuid().simple().to_string();
        Self(format!("doc-{}", &simple[..12]))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Canonical identity of a document, immutable once assigned.
///
/// Wraps a UUID so document identities cannot be confused with other
/// UUID-based values. Minted randomly (v4) or deterministically from a
/// business key (v5), and never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentUuid(Uuid);

impl DocumentUuid {
    /// Mints a new random document UUID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a deterministic UUID from a source system and business key.
    ///
    /// The same `(source_system, key)` pair always yields the same UUID,
    /// so re-registering a known business key is idempotent.
    pub fn from_business_key(source_system: &str, key: &IdentityKey) -> Self {
        let namespace = Uuid::new_v5(&Uuid::NAMESPACE_OID, source_system.as_bytes());
        Self(Uuid::new_v5(&namespace, key.as_str().as_bytes()))
    }

    /// Creates a document UUID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DocumentUuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for DocumentUuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<DocumentUuid> for Uuid {
    fn from(id: DocumentUuid) -> Self {
        id.0
    }
}

/// External business identifier associated with a document's canonical
/// UUID, e.g. a case or file number from the source system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Creates an identity key from a business key string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
