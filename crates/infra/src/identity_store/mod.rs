//! Principal persistence boundary.
//!
//! The engine reads principals and their grants through [`IdentityStore`]
//! without assuming a backend: [`InMemoryIdentityStore`] for tests/dev,
//! [`PostgresIdentityStore`] for production. Both interpret the same
//! [`warden_schema::StorageSchema`].

pub mod in_memory;
pub mod postgres;
pub mod predicate;
pub mod r#trait;

pub use in_memory::InMemoryIdentityStore;
pub use postgres::PostgresIdentityStore;
pub use predicate::{Predicate, identity_value};
pub use r#trait::{IdentityStore, StoreError};
