use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::{Session, SessionStore};
use crate::identity_store::StoreError;

/// In-memory session store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    inner: RwLock<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find<F>(&self, pred: F) -> Result<Option<Session>, StoreError>
    where
        F: Fn(&Session) -> bool,
    {
        let map = self
            .inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(map.values().find(|s| pred(s)).cloned())
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn upsert(&self, session: Session) -> Result<(), StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        map.retain(|_, s| s.owner != session.owner);
        map.insert(session.id, session);
        Ok(())
    }

    async fn by_access(&self, access: Uuid) -> Result<Option<Session>, StoreError> {
        self.find(|s| s.access == access)
    }

    async fn by_refresh(&self, refresh: Uuid) -> Result<Option<Session>, StoreError> {
        self.find(|s| s.refresh == refresh)
    }

    async fn remove(&self, access: Uuid) -> Result<bool, StoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        let before = map.len();
        map.retain(|_, s| s.access != access);
        Ok(map.len() < before)
    }
}
