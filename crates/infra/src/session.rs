//! Session-mode credential handling.
//!
//! Access and refresh tokens are opaque UUIDs backed by the session relation.
//! Resolving an access token yields [`TokenClaims`] built from the principal's
//! live grant set, which the guard then checks like any decoded token.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use warden_auth::{Denial, TokenClaims};
use warden_core::IdentityId;

use crate::account::AccountError;
use crate::identity_store::IdentityStore;
use crate::session_store::{Session, SessionStore};

#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionStore>,
    identities: Arc<dyn IdentityStore>,
    ttl: Duration,
}

impl SessionService {
    pub fn new(sessions: Arc<dyn SessionStore>, identities: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self {
            sessions,
            identities,
            ttl,
        }
    }

    /// Open a fresh session, replacing any the principal already holds.
    #[instrument(skip(self), fields(identity = %owner), err)]
    pub async fn open(&self, owner: IdentityId, now: DateTime<Utc>) -> Result<Session, AccountError> {
        let session = Session {
            id: Uuid::new_v4(),
            owner,
            access: Uuid::new_v4(),
            refresh: Uuid::new_v4(),
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.sessions.upsert(session.clone()).await?;
        info!(identity = %session.owner, "session opened");
        Ok(session)
    }

    /// Claims for a live access token.
    pub async fn resolve(&self, access: &str, now: DateTime<Utc>) -> Result<TokenClaims, Denial> {
        let session = self.find(access, Lookup::Access).await?;
        if session.is_expired(now) {
            return Err(Denial::ExpiredCredential);
        }
        let granted = self
            .identities
            .granted_permissions(&session.owner)
            .await
            .map_err(|e| {
                warn!(error = %e, "grant lookup failed");
                Denial::InvalidCredential
            })?;
        Ok(TokenClaims {
            identity_id: session.owner,
            expires_at: session.expires_at,
            granted_permission_ids: granted,
        })
    }

    /// Rotate both tokens of the session holding `refresh`.
    ///
    /// A refresh token stays usable for one further session lifetime after
    /// the access token expired; it is single-use because rotation replaces it.
    #[instrument(skip(self, refresh), err)]
    pub async fn refresh(&self, refresh: &str, now: DateTime<Utc>) -> Result<Session, Denial> {
        let session = self.find(refresh, Lookup::Refresh).await?;
        let refresh_until = session.expires_at.checked_add_signed(self.ttl);
        if refresh_until.is_some_and(|until| now >= until) {
            return Err(Denial::ExpiredCredential);
        }
        self.open(session.owner, now).await.map_err(|e| {
            warn!(error = %e, "session rotation failed");
            Denial::InvalidCredential
        })
    }

    /// Close the session holding `access`. Returns whether one existed.
    pub async fn close(&self, access: &str) -> Result<bool, AccountError> {
        let Ok(access) = Uuid::parse_str(access) else {
            return Ok(false);
        };
        Ok(self.sessions.remove(access).await?)
    }

    async fn find(&self, token: &str, by: Lookup) -> Result<Session, Denial> {
        let token = Uuid::parse_str(token).map_err(|_| Denial::InvalidCredential)?;
        let found = match by {
            Lookup::Access => self.sessions.by_access(token).await,
            Lookup::Refresh => self.sessions.by_refresh(token).await,
        };
        match found {
            Ok(Some(session)) => Ok(session),
            Ok(None) => Err(Denial::InvalidCredential),
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                Err(Denial::InvalidCredential)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Access,
    Refresh,
}

impl core::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
