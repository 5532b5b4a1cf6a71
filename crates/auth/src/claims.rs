use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::IdentityId;

use crate::permissions::PermissionId;

/// Token claims model (transport-agnostic).
///
/// A snapshot of the principal and its granted permission ids at issuance.
/// Grant changes after issuance are not reflected until a new token is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identity attribute value of the principal.
    #[serde(rename = "uid")]
    pub identity_id: IdentityId,

    /// Expiration, second precision on the wire.
    #[serde(rename = "exp", with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// Catalog ids granted at issuance.
    #[serde(rename = "perms", default)]
    pub granted_permission_ids: Vec<PermissionId>,
}

impl TokenClaims {
    /// Claims expiring `ttl` after `now`, truncated to whole seconds.
    ///
    /// Saturates at the latest representable instant.
    pub fn issue(
        identity_id: IdentityId,
        granted_permission_ids: Vec<PermissionId>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expires_at = expires_at.with_nanosecond(0).unwrap_or(expires_at);
        Self {
            identity_id,
            expires_at,
            granted_permission_ids,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn grants(&self, id: PermissionId) -> bool {
        self.granted_permission_ids.contains(&id)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,
}

/// Deterministically validate claims against `now`.
///
/// Signature verification happens in the codec; this checks the time window only.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.is_expired(now) {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}
