//! `warden-schema` — declarative entity description and everything derived from it.
//!
//! Build-time data flows one way: tagged attributes → [`EntityDescriptor`] →
//! typed [`SchemaView`]s and the persisted [`StorageSchema`]. All artifacts are
//! built once at startup and are immutable afterwards.

pub mod descriptor;
pub mod hash;
pub mod storage;
pub mod tag;
pub mod validator;
pub mod view;

pub use descriptor::{
    Attribute, AttributeDecl, ContactAttribute, EntityDescriptor, IdentityAttribute, ParseOptions,
};
pub use hash::{HashTransform, sha256_hex};
pub use storage::{
    AuthMode, ForeignKey, Generation, PostgresTypes, StorageColumnSpec, StorageDeclaration,
    StorageOptions, StorageSchema, StorageType, TableSpec, TypeMapping,
};
pub use tag::{FieldTag, TagKind};
pub use validator::ValidatorSpec;
pub use view::{SchemaView, SchemaViews, ViewField, ViewKind};
