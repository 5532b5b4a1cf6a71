//! Guard-facing identity lookup backed by an [`IdentityStore`].

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use warden_auth::{IdentityLookup, LookupError};
use warden_core::{IdentityId, Record};

use crate::identity_store::{IdentityStore, Predicate, StoreError};

/// Reads a principal by identity value, bounded by a timeout.
#[derive(Clone)]
pub struct StoreLookup {
    store: Arc<dyn IdentityStore>,
    timeout: Duration,
}

impl StoreLookup {
    pub fn new(store: Arc<dyn IdentityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }
}

#[async_trait::async_trait]
impl IdentityLookup for StoreLookup {
    async fn find_identity(&self, id: &IdentityId) -> Result<Option<Record>, LookupError> {
        let predicate = Predicate::identity(self.store.schema(), id);
        match tokio::time::timeout(self.timeout, self.store.read_one(&predicate)).await {
            Ok(Ok(row)) => Ok(row),
            Ok(Err(StoreError::Unavailable(e))) | Ok(Err(StoreError::Backend(e))) => {
                Err(LookupError::Backend(e))
            }
            Ok(Err(e)) => Err(LookupError::Backend(e.to_string())),
            Err(_) => {
                warn!(
                    identity = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "identity lookup timed out"
                );
                Err(LookupError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_auth::{PermissionCatalog, PermissionId};
    use warden_schema::StorageSchema;

    /// Never answers.
    struct Stalled(Arc<StorageSchema>);

    #[async_trait::async_trait]
    impl IdentityStore for Stalled {
        fn schema(&self) -> &StorageSchema {
            &self.0
        }
        async fn install(&self, _: &PermissionCatalog) -> Result<(), StoreError> {
            Ok(())
        }
        async fn create(&self, row: Record, _: &[PermissionId]) -> Result<Record, StoreError> {
            Ok(row)
        }
        async fn read_one(&self, _: &Predicate) -> Result<Option<Record>, StoreError> {
            std::future::pending().await
        }
        async fn read_many(&self, _: &Predicate) -> Result<Vec<Record>, StoreError> {
            Ok(vec![])
        }
        async fn update(&self, _: &IdentityId, changes: Record) -> Result<Record, StoreError> {
            Ok(changes)
        }
        async fn delete(&self, _: &IdentityId) -> Result<(), StoreError> {
            Ok(())
        }
        async fn granted_permissions(&self, _: &IdentityId) -> Result<Vec<PermissionId>, StoreError> {
            Ok(vec![])
        }
        async fn revoke(&self, _: &IdentityId, _: PermissionId) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let schema = crate::test_support::schema(warden_schema::AuthMode::Token);
        let lookup = StoreLookup::new(Arc::new(Stalled(schema)), Duration::from_millis(20));

        assert_eq!(
            lookup.find_identity(&IdentityId::Int(1)).await,
            Err(LookupError::Timeout)
        );
    }
}
