//! Build-time artifacts of one identity entity, assembled together.

use std::sync::Arc;

use tracing::info;

use warden_auth::{Permission, ResolvedRoles, RoleDescriptor, resolve_roles};
use warden_core::ModelError;
use warden_schema::{
    AttributeDecl, EntityDescriptor, ParseOptions, SchemaViews, StorageDeclaration, StorageOptions,
    StorageSchema, TypeMapping,
};

/// Declarative input for an [`IdentityModel`].
#[derive(Debug, Clone, Default)]
pub struct ModelDeclaration {
    pub entity: String,
    pub attributes: Vec<AttributeDecl>,
    pub parse: ParseOptions,
    pub storage: StorageDeclaration,
    pub roles: Vec<RoleDescriptor>,
    pub default_grants: Option<Vec<Permission>>,
}

/// Descriptor, views, storage schema and role catalog of one entity.
///
/// Built once at startup, immutable afterwards.
#[derive(Debug, Clone)]
pub struct IdentityModel {
    pub descriptor: EntityDescriptor,
    pub views: SchemaViews,
    pub storage: Arc<StorageSchema>,
    pub roles: ResolvedRoles,
}

impl IdentityModel {
    pub fn build(
        declaration: ModelDeclaration,
        types: &dyn TypeMapping,
        options: &StorageOptions,
    ) -> Result<Self, ModelError> {
        let descriptor =
            EntityDescriptor::parse(declaration.entity, declaration.attributes, &declaration.parse)?;
        let views = SchemaViews::build(&descriptor);
        let storage = StorageSchema::build(&descriptor, &declaration.storage, types, options)?;
        let roles = resolve_roles(&declaration.roles, declaration.default_grants.as_deref())?;

        info!(
            entity = descriptor.name(),
            roles = roles.roles().count(),
            "identity model built"
        );

        Ok(Self {
            descriptor,
            views,
            storage: Arc::new(storage),
            roles,
        })
    }
}
