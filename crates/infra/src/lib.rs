//! Infrastructure layer: identity storage, sessions and the account services.
//!
//! Storage is reached only through the [`IdentityStore`] and [`SessionStore`]
//! traits; a PostgreSQL adapter (sqlx) and an in-memory adapter implement both.

pub mod account;
pub mod identity_store;
pub mod lookup;
pub mod model;
pub mod session;
pub mod session_store;

#[cfg(test)]
mod test_support;

pub use account::{AccountError, AccountService, LoginGrant};
pub use identity_store::{
    IdentityStore, InMemoryIdentityStore, PostgresIdentityStore, Predicate, StoreError,
    identity_value,
};
pub use lookup::StoreLookup;
pub use model::{IdentityModel, ModelDeclaration};
pub use session::SessionService;
pub use session_store::{InMemorySessionStore, Session, SessionStore};
