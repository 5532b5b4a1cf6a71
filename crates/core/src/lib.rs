//! `warden-core` — shared primitives for the identity/authorization engine.
//!
//! This crate contains **pure** building blocks (no storage, no transport):
//! the attribute value model, identity identifiers and the error taxonomy.

pub mod error;
pub mod id;
pub mod value;

pub use error::{ArgumentsError, FieldError, FieldErrorKind, ModelError, ValidationError};
pub use id::IdentityId;
pub use value::{CoerceError, Record, Value, ValueType};
