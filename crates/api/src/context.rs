use warden_auth::{Authorized, PermissionId};
use warden_core::{IdentityId, Record};

/// Principal context for a guarded request.
///
/// Inserted as a request extension once the guard authorized the request.
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalContext {
    authorized: Authorized,
}

impl PrincipalContext {
    pub fn new(authorized: Authorized) -> Self {
        Self { authorized }
    }

    pub fn identity_id(&self) -> &IdentityId {
        &self.authorized.claims.identity_id
    }

    pub fn granted(&self) -> &[PermissionId] {
        &self.authorized.claims.granted_permission_ids
    }

    /// Materialized principal; present only for routes that asked for it.
    pub fn identity(&self) -> Option<&Record> {
        self.authorized.identity.as_ref()
    }
}
