//! `warden-auth` — role/permission resolution and the authorization guard.
//!
//! This crate is intentionally decoupled from HTTP and storage: the guard
//! reaches storage only through the [`IdentityLookup`] trait.

pub mod claims;
pub mod guard;
pub mod permissions;
pub mod roles;
pub mod token;

pub use claims::{TokenClaims, TokenValidationError, validate_claims};
pub use guard::{Authorized, Denial, Guard, GuardState, IdentityLookup, LookupError, Requirements};
pub use permissions::{Permission, PermissionCatalog, PermissionId};
pub use roles::{DEFAULT_ROLE, ResolvedRoles, Role, RoleDescriptor, resolve_roles};
pub use token::{Hs256TokenCodec, TokenCodec, TokenError};
