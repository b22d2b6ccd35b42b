//! Identity service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{DocumentUuid, IdentityKey};
use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Per-backend record IDs bound to one canonical UUID.
///
/// Binding is additive: merging a partial set of IDs never erases IDs
/// bound earlier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendBindings {
    pub relational_id: Option<String>,
    pub graph_id: Option<String>,
    pub vector_id: Option<String>,
    pub file_storage_id: Option<String>,
}

impl BackendBindings {
    /// Merges `other` into `self`, keeping existing IDs where `other`
    /// has none.
    pub fn merge(&mut self, other: &BackendBindings) {
        if other.relational_id.is_some() {
            self.relational_id = other.relational_id.clone();
        }
        if other.graph_id.is_some() {
            self.graph_id = other.graph_id.clone();
        }
        if other.vector_id.is_some() {
            self.vector_id = other.vector_id.clone();
        }
        if other.file_storage_id.is_some() {
            self.file_storage_id = other.file_storage_id.clone();
        }
    }

    /// Returns true if no backend ID is bound.
    pub fn is_empty(&self) -> bool {
        self.relational_id.is_none()
            && self.graph_id.is_none()
            && self.vector_id.is_none()
            && self.file_storage_id.is_none()
    }
}

/// A registered canonical identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub uuid: DocumentUuid,
    pub source_system: String,
    pub identity_key: Option<IdentityKey>,
    pub registered_at: DateTime<Utc>,
    pub bindings: BackendBindings,
    /// Set when the document was deleted. The UUID stays registered so
    /// it can never be minted again for a different document.
    pub released: bool,
}

/// Port for the identity-mapping service.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Mints a canonical UUID: deterministic (v5) when an identity key
    /// is supplied, random (v4) otherwise.
    async fn generate_uuid(
        &self,
        source_system: &str,
        identity_key: Option<&IdentityKey>,
    ) -> Result<DocumentUuid, IdentityError>;

    /// Registers a UUID. Re-registering a known UUID returns the
    /// existing record, clearing any release tombstone: the same
    /// canonical identity is live again.
    async fn register_uuid(
        &self,
        uuid: DocumentUuid,
        source_system: &str,
        identity_key: Option<&IdentityKey>,
    ) -> Result<IdentityRecord, IdentityError>;

    /// Binds backend record IDs to a registered UUID, additively.
    async fn bind_database_ids(
        &self,
        uuid: DocumentUuid,
        bindings: BackendBindings,
    ) -> Result<(), IdentityError>;

    /// Resolves an identity key to its canonical UUID, if registered.
    async fn resolve_identity_key(
        &self,
        identity_key: &IdentityKey,
    ) -> Result<Option<DocumentUuid>, IdentityError>;

    /// Marks a registration as released. The UUID is never recycled,
    /// so the record is tombstoned rather than removed.
    async fn release_uuid(&self, uuid: DocumentUuid) -> Result<(), IdentityError>;
}

#[derive(Debug, Default)]
struct InMemoryIdentityState {
    records: HashMap<DocumentUuid, IdentityRecord>,
    by_key: HashMap<IdentityKey, DocumentUuid>,
    fail_on_bind: bool,
}

/// In-memory identity service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityService {
    state: Arc<RwLock<InMemoryIdentityState>>,
}

impl InMemoryIdentityService {
    /// Creates a new empty in-memory identity service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail binding calls.
    pub fn set_fail_on_bind(&self, fail: bool) {
        self.state.write().unwrap().fail_on_bind = fail;
    }

    /// Returns the registered record for a UUID, if any.
    pub fn record(&self, uuid: DocumentUuid) -> Option<IdentityRecord> {
        self.state.read().unwrap().records.get(&uuid).cloned()
    }

    /// Returns the number of registered UUIDs, tombstoned ones included.
    pub fn registration_count(&self) -> usize {
        self.state.read().unwrap().records.len()
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn generate_uuid(
        &self,
        source_system: &str,
        identity_key: Option<&IdentityKey>,
    ) -> Result<DocumentUuid, IdentityError> {
        Ok(match identity_key {
            Some(key) => DocumentUuid::from_business_key(source_system, key),
            None => DocumentUuid::new(),
        })
    }

    async fn register_uuid(
        &self,
        uuid: DocumentUuid,
        source_system: &str,
        identity_key: Option<&IdentityKey>,
    ) -> Result<IdentityRecord, IdentityError> {
        let mut state = self.state.write().unwrap();

        if let Some(existing) = state.records.get_mut(&uuid) {
            existing.released = false;
            return Ok(existing.clone());
        }

        let record = IdentityRecord {
            uuid,
            source_system: source_system.to_string(),
            identity_key: identity_key.cloned(),
            registered_at: Utc::now(),
            bindings: BackendBindings::default(),
            released: false,
        };
        if let Some(key) = identity_key {
            state.by_key.insert(key.clone(), uuid);
        }
        state.records.insert(uuid, record.clone());
        Ok(record)
    }

    async fn bind_database_ids(
        &self,
        uuid: DocumentUuid,
        bindings: BackendBindings,
    ) -> Result<(), IdentityError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_bind {
            return Err(IdentityError::BindingFailed {
                uuid,
                reason: "identity service rejected binding".to_string(),
            });
        }

        let record = state
            .records
            .get_mut(&uuid)
            .ok_or(IdentityError::UnknownUuid(uuid))?;
        record.bindings.merge(&bindings);
        Ok(())
    }

    async fn resolve_identity_key(
        &self,
        identity_key: &IdentityKey,
    ) -> Result<Option<DocumentUuid>, IdentityError> {
        Ok(self.state.read().unwrap().by_key.get(identity_key).copied())
    }

    async fn release_uuid(&self, uuid: DocumentUuid) -> Result<(), IdentityError> {
        let mut state = self.state.write().unwrap();
        let record = state
            .records
            .get_mut(&uuid)
            .ok_or(IdentityError::UnknownUuid(uuid))?;
        record.released = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_is_deterministic_with_key() {
        let service = InMemoryIdentityService::new();
        let key = IdentityKey::new("AZ-2024-0042");

        let a = service.generate_uuid("registry", Some(&key)).await.unwrap();
        let b = service.generate_uuid("registry", Some(&key)).await.unwrap();
        assert_eq!(a, b);

        let c = service.generate_uuid("registry", None).await.unwrap();
        let d = service.generate_uuid("registry", None).await.unwrap();
        assert_ne!(c, d);
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let service = InMemoryIdentityService::new();
        let key = IdentityKey::new("AZ-2024-0042");
        let uuid = service.generate_uuid("registry", Some(&key)).await.unwrap();

        service
            .register_uuid(uuid, "registry", Some(&key))
            .await
            .unwrap();

        let resolved = service.resolve_identity_key(&key).await.unwrap();
        assert_eq!(resolved, Some(uuid));

        let unknown = IdentityKey::new("AZ-0000-0000");
        assert_eq!(service.resolve_identity_key(&unknown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reregistration_returns_existing_record() {
        let service = InMemoryIdentityService::new();
        let uuid = DocumentUuid::new();

        let first = service.register_uuid(uuid, "registry", None).await.unwrap();
        let second = service.register_uuid(uuid, "other", None).await.unwrap();

        assert_eq!(second.source_system, first.source_system);
        assert_eq!(service.registration_count(), 1);
    }

    #[tokio::test]
    async fn test_binding_is_additive() {
        let service = InMemoryIdentityService::new();
        let uuid = DocumentUuid::new();
        service.register_uuid(uuid, "registry", None).await.unwrap();

        service
            .bind_database_ids(
                uuid,
                BackendBindings {
                    relational_id: Some("row-0001".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        service
            .bind_database_ids(
                uuid,
                BackendBindings {
                    graph_id: Some("node-0001".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = service.record(uuid).unwrap();
        assert_eq!(record.bindings.relational_id.as_deref(), Some("row-0001"));
        assert_eq!(record.bindings.graph_id.as_deref(), Some("node-0001"));
    }

    #[tokio::test]
    async fn test_bind_unknown_uuid() {
        let service = InMemoryIdentityService::new();
        let err = service
            .bind_database_ids(DocumentUuid::new(), BackendBindings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::UnknownUuid(_)));
    }

    #[tokio::test]
    async fn test_reregistration_revives_a_released_uuid() {
        let service = InMemoryIdentityService::new();
        let uuid = DocumentUuid::new();
        service.register_uuid(uuid, "registry", None).await.unwrap();
        service.release_uuid(uuid).await.unwrap();

        let record = service.register_uuid(uuid, "registry", None).await.unwrap();

        assert!(!record.released);
        assert!(!service.record(uuid).unwrap().released);
        assert_eq!(service.registration_count(), 1);
    }

    #[tokio::test]
    async fn test_release_tombstones_without_removing() {
        let service = InMemoryIdentityService::new();
        let uuid = DocumentUuid::new();
        service.register_uuid(uuid, "registry", None).await.unwrap();

        service.release_uuid(uuid).await.unwrap();

        let record = service.record(uuid).unwrap();
        assert!(record.released);
        assert_eq!(service.registration_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_bind_toggle() {
        let service = InMemoryIdentityService::new();
        let uuid = DocumentUuid::new();
        service.register_uuid(uuid, "registry", None).await.unwrap();
        service.set_fail_on_bind(true);

        let err = service
            .bind_database_ids(uuid, BackendBindings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::BindingFailed { .. }));
    }
}
