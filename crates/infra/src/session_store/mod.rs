//! Server-side sessions for the session-based authorization mode.

pub mod in_memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use warden_core::IdentityId;

use crate::identity_store::StoreError;

pub use in_memory::InMemorySessionStore;

/// One live session. A principal holds at most one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    #[serde(skip)]
    pub id: Uuid,
    pub owner: IdentityId,
    pub access: Uuid,
    pub refresh: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `session`, replacing any session the same owner already holds.
    async fn upsert(&self, session: Session) -> Result<(), StoreError>;

    async fn by_access(&self, access: Uuid) -> Result<Option<Session>, StoreError>;

    async fn by_refresh(&self, refresh: Uuid) -> Result<Option<Session>, StoreError>;

    /// Remove the session holding `access`. Returns whether one existed.
    async fn remove(&self, access: Uuid) -> Result<bool, StoreError>;
}
