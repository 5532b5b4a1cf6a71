use std::sync::Arc;

use thiserror::Error;

use warden_auth::{PermissionCatalog, PermissionId};
use warden_core::{IdentityId, Record};
use warden_schema::StorageSchema;

use super::predicate::Predicate;

/// Storage operation error.
///
/// These are **infrastructure errors**. Callers map `Conflict` to a rejected
/// submission and everything else to a generic failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness, not-null or reference constraint rejected the write.
    /// The write was rolled back.
    #[error("constraint violation: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The backend could not be reached (pool closed, timeout, I/O).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Persistence of principals and their permission grants.
///
/// Rows are plain [`Record`]s keyed by the column names of the entity
/// relation in [`StorageSchema`]. Implementations must:
/// - generate identity values per the identity column's generation strategy
/// - enforce not-null and uniqueness of the entity relation
/// - write a principal and its initial grants atomically
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    fn schema(&self) -> &StorageSchema;

    /// Create the relations if missing and seed the permission catalog.
    async fn install(&self, catalog: &PermissionCatalog) -> Result<(), StoreError>;

    /// Insert a principal together with its grants. Returns the stored row.
    async fn create(&self, row: Record, grants: &[PermissionId]) -> Result<Record, StoreError>;

    async fn read_one(&self, predicate: &Predicate) -> Result<Option<Record>, StoreError>;

    async fn read_many(&self, predicate: &Predicate) -> Result<Vec<Record>, StoreError>;

    /// Apply `changes` to an existing principal. Returns the updated row.
    async fn update(&self, id: &IdentityId, changes: Record) -> Result<Record, StoreError>;

    /// Delete a principal; its grants and sessions go with it.
    async fn delete(&self, id: &IdentityId) -> Result<(), StoreError>;

    /// Granted permission ids, ascending.
    async fn granted_permissions(&self, id: &IdentityId) -> Result<Vec<PermissionId>, StoreError>;

    /// Remove one grant. Returns whether it existed.
    async fn revoke(&self, id: &IdentityId, permission: PermissionId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<S> IdentityStore for Arc<S>
where
    S: IdentityStore + ?Sized,
{
    fn schema(&self) -> &StorageSchema {
        (**self).schema()
    }

    async fn install(&self, catalog: &PermissionCatalog) -> Result<(), StoreError> {
        (**self).install(catalog).await
    }

    async fn create(&self, row: Record, grants: &[PermissionId]) -> Result<Record, StoreError> {
        (**self).create(row, grants).await
    }

    async fn read_one(&self, predicate: &Predicate) -> Result<Option<Record>, StoreError> {
        (**self).read_one(predicate).await
    }

    async fn read_many(&self, predicate: &Predicate) -> Result<Vec<Record>, StoreError> {
        (**self).read_many(predicate).await
    }

    async fn update(&self, id: &IdentityId, changes: Record) -> Result<Record, StoreError> {
        (**self).update(id, changes).await
    }

    async fn delete(&self, id: &IdentityId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }

    async fn granted_permissions(&self, id: &IdentityId) -> Result<Vec<PermissionId>, StoreError> {
        (**self).granted_permissions(id).await
    }

    async fn revoke(&self, id: &IdentityId, permission: PermissionId) -> Result<bool, StoreError> {
        (**self).revoke(id, permission).await
    }
}
