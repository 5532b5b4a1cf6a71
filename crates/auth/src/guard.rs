//! Authorization guard gating protected operations.
//!
//! Per invocation: decode the credential, look the principal up exactly once,
//! then check required permissions and required roles. Every outcome is either
//! [`Authorized`] or one of the four [`Denial`] reasons.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::{ArgumentsError, IdentityId, Record};
use warden_schema::SchemaView;

use crate::claims::TokenClaims;
use crate::permissions::{Permission, PermissionId};
use crate::roles::{ResolvedRoles, Role};
use crate::token::{TokenCodec, TokenError};

/// Declared requirements of a protected operation. Either list may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    pub permissions: Vec<Permission>,
    pub roles: Vec<Role>,
    /// Materialize the principal's record for the operation.
    pub inject_identity: bool,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permission(mut self, permission: impl Into<Permission>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn role(mut self, role: impl Into<Role>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_identity(mut self) -> Self {
        self.inject_identity = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    NoToken,
    Decoding,
    Expired,
    InvalidSignature,
    UserLookup,
    UserMissing,
    PermissionCheck,
    RoleCheck,
    Authorized,
    Denied,
}

/// Why the guard refused an invocation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Denial {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("expired credential")]
    ExpiredCredential,

    #[error("insufficient rights")]
    InsufficientRights,
}

impl Denial {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            Denial::MissingCredential => "missing_credential",
            Denial::InvalidCredential => "invalid_credential",
            Denial::ExpiredCredential => "expired_credential",
            Denial::InsufficientRights => "insufficient_rights",
        }
    }

    /// HTTP status class of the denial.
    pub fn status(self) -> u16 {
        match self {
            Denial::MissingCredential => 400,
            Denial::InvalidCredential | Denial::ExpiredCredential | Denial::InsufficientRights => {
                403
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("identity lookup timed out")]
    Timeout,

    #[error("identity lookup failed: {0}")]
    Backend(String),
}

/// Storage-side read of a principal by identity value.
#[async_trait::async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn find_identity(&self, id: &IdentityId) -> Result<Option<Record>, LookupError>;
}

/// Successful guard outcome handed to the protected operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Authorized {
    pub claims: TokenClaims,
    /// Present only when the requirements asked for identity injection.
    pub identity: Option<Record>,
}

/// A guard bound to one set of requirements.
///
/// Requirement names are resolved to catalog ids once, at construction.
#[derive(Clone)]
pub struct Guard {
    requirements: Requirements,
    required_ids: Vec<PermissionId>,
    role_ids: Vec<(Role, Vec<PermissionId>)>,
    codec: Arc<dyn TokenCodec>,
    base_view: Arc<SchemaView>,
}

impl core::fmt::Debug for Guard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Guard")
            .field("requirements", &self.requirements)
            .field("required_ids", &self.required_ids)
            .finish_non_exhaustive()
    }
}

impl Guard {
    /// Fails if a required permission or role is not part of `roles`.
    pub fn new(
        requirements: Requirements,
        roles: &ResolvedRoles,
        codec: Arc<dyn TokenCodec>,
        base_view: Arc<SchemaView>,
    ) -> Result<Self, ArgumentsError> {
        let required_ids = requirements
            .permissions
            .iter()
            .map(|p| {
                roles.catalog().id_of(p.as_str()).ok_or_else(|| {
                    ArgumentsError::new(format!("unknown permission '{p}' in guard requirements"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let role_ids = requirements
            .roles
            .iter()
            .map(|r| {
                roles
                    .granted_ids(r.as_str())
                    .map(|ids| (r.clone(), ids))
                    .ok_or_else(|| {
                        ArgumentsError::new(format!("unknown role '{r}' in guard requirements"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            requirements,
            required_ids,
            role_ids,
            codec,
            base_view,
        })
    }

    pub fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Evaluate one invocation.
    ///
    /// The lookup is the only await point. Lookup failures and timeouts are
    /// treated as a miss.
    pub async fn evaluate(
        &self,
        credential: Option<&str>,
        lookup: &dyn IdentityLookup,
        now: DateTime<Utc>,
    ) -> Result<Authorized, Denial> {
        let Some(token) = credential.filter(|t| !t.is_empty()) else {
            return Err(deny(GuardState::NoToken, Denial::MissingCredential));
        };

        transition(GuardState::Decoding);
        let claims = match self.codec.decode(token, now) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => {
                return Err(deny(GuardState::Expired, Denial::ExpiredCredential));
            }
            Err(TokenError::Invalid | TokenError::Encode(_)) => {
                return Err(deny(GuardState::InvalidSignature, Denial::InvalidCredential));
            }
        };

        self.evaluate_claims(claims, lookup).await
    }

    /// Evaluate already-resolved claims: lookup, then rights.
    ///
    /// Used where the credential is not a self-contained token and claims are
    /// produced elsewhere, e.g. from a server-side session.
    pub async fn evaluate_claims(
        &self,
        claims: TokenClaims,
        lookup: &dyn IdentityLookup,
    ) -> Result<Authorized, Denial> {
        transition(GuardState::UserLookup);
        let record = match lookup.find_identity(&claims.identity_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(deny(GuardState::UserMissing, Denial::InvalidCredential)),
            Err(e) => {
                warn!(error = %e, identity = %claims.identity_id, "identity lookup failed");
                return Err(deny(GuardState::UserMissing, Denial::InvalidCredential));
            }
        };

        self.check_rights(&claims)?;

        transition(GuardState::Authorized);
        let identity = self
            .requirements
            .inject_identity
            .then(|| self.base_view.materialize(&record));
        Ok(Authorized { claims, identity })
    }

    /// Permission check (AND over names) followed by the role check (OR over roles).
    ///
    /// A role counts as satisfied when at least one of its granted ids is in the
    /// claims; a role with no grants can never be satisfied.
    pub fn check_rights(&self, claims: &TokenClaims) -> Result<(), Denial> {
        transition(GuardState::PermissionCheck);
        if !self.required_ids.iter().all(|id| claims.grants(*id)) {
            return Err(deny(GuardState::PermissionCheck, Denial::InsufficientRights));
        }

        if self.role_ids.is_empty() {
            return Ok(());
        }

        transition(GuardState::RoleCheck);
        let satisfied = self
            .role_ids
            .iter()
            .any(|(_, ids)| ids.iter().any(|id| claims.grants(*id)));
        if !satisfied {
            return Err(deny(GuardState::RoleCheck, Denial::InsufficientRights));
        }
        Ok(())
    }

    /// Evaluate, then run `op` with the outcome on success. The result of `op`
    /// is returned unchanged.
    pub async fn run<F, Fut, T>(
        &self,
        credential: Option<&str>,
        lookup: &dyn IdentityLookup,
        now: DateTime<Utc>,
        op: F,
    ) -> Result<T, Denial>
    where
        F: FnOnce(Authorized) -> Fut,
        Fut: Future<Output = T>,
    {
        let authorized = self.evaluate(credential, lookup, now).await?;
        Ok(op(authorized).await)
    }
}

fn transition(state: GuardState) {
    debug!(?state, "guard transition");
}

fn deny(at: GuardState, denial: Denial) -> Denial {
    debug!(state = ?at, code = denial.code(), "guard denied");
    transition(GuardState::Denied);
    denial
}
