use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::info;
use warden_core::ModelError;

use crate::permissions::{Permission, PermissionCatalog, PermissionId};

/// Name of the role every registration falls back to.
pub const DEFAULT_ROLE: &str = "default";

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Role {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

/// Declarative role: permission name → granted flag, in declaration order.
///
/// Denied (`false`) entries still enter the permission catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDescriptor {
    pub name: Role,
    pub permissions: Vec<(Permission, bool)>,
}

impl RoleDescriptor {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: Role::new(name),
            permissions: Vec::new(),
        }
    }

    pub fn with(mut self, permission: impl Into<Permission>, granted: bool) -> Self {
        self.permissions.push((permission.into(), granted));
        self
    }

    pub fn grant(self, permission: impl Into<Permission>) -> Self {
        self.with(permission, true)
    }

    pub fn deny(self, permission: impl Into<Permission>) -> Self {
        self.with(permission, false)
    }
}

/// Resolved role set: the permission catalog plus per-role grant lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoles {
    catalog: PermissionCatalog,
    grants: Vec<(Role, Vec<Permission>)>,
}

impl ResolvedRoles {
    pub fn catalog(&self) -> &PermissionCatalog {
        &self.catalog
    }

    /// Roles in declaration order; the default role comes last.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.grants.iter().map(|(r, _)| r)
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.grants_of(role).is_some()
    }

    /// Granted permission names of `role`.
    pub fn grants_of(&self, role: &str) -> Option<&[Permission]> {
        self.grants
            .iter()
            .find(|(r, _)| r.as_str() == role)
            .map(|(_, p)| p.as_slice())
    }

    /// Granted permission ids of `role`, resolved through the catalog.
    pub fn granted_ids(&self, role: &str) -> Option<Vec<PermissionId>> {
        self.grants_of(role).map(|perms| {
            perms
                .iter()
                .filter_map(|p| self.catalog.id_of(p.as_str()))
                .collect()
        })
    }
}

/// Resolve role declarations into a catalog and per-role grants.
///
/// Pure: identical input always yields an identical result. The `default`
/// role always exists; its grants come from `default_grants` (all granted) or
/// from an explicitly declared `default` role, never both.
pub fn resolve_roles(
    roles: &[RoleDescriptor],
    default_grants: Option<&[Permission]>,
) -> Result<ResolvedRoles, ModelError> {
    let mut seen_roles = HashSet::new();
    for role in roles {
        if !seen_roles.insert(role.name.as_str()) {
            return Err(ModelError::invalid(format!(
                "role '{}' declared more than once",
                role.name
            )));
        }
        let mut seen_perms = HashSet::new();
        for (perm, _) in &role.permissions {
            if !seen_perms.insert(perm.as_str()) {
                return Err(ModelError::invalid(format!(
                    "role '{}' lists permission '{}' more than once",
                    role.name, perm
                )));
            }
        }
    }
    if seen_roles.contains(DEFAULT_ROLE) && default_grants.is_some() {
        return Err(ModelError::invalid(
            "default role declared both as a role and as a default grant list",
        ));
    }

    let mentioned = roles
        .iter()
        .flat_map(|r| r.permissions.iter().map(|(p, _)| p.clone()))
        .chain(default_grants.into_iter().flatten().cloned());
    let catalog = PermissionCatalog::from_names(mentioned);

    let mut grants: Vec<(Role, Vec<Permission>)> = roles
        .iter()
        .map(|r| {
            let granted = r
                .permissions
                .iter()
                .filter(|(_, granted)| *granted)
                .map(|(p, _)| p.clone())
                .collect();
            (r.name.clone(), granted)
        })
        .collect();

    if !seen_roles.contains(DEFAULT_ROLE) {
        let mut defaults: Vec<Permission> = Vec::new();
        for p in default_grants.into_iter().flatten() {
            if !defaults.contains(p) {
                defaults.push(p.clone());
            }
        }
        grants.push((Role::new(DEFAULT_ROLE), defaults));
    }

    info!(
        roles = grants.len(),
        permissions = catalog.len(),
        "role catalog resolved"
    );

    Ok(ResolvedRoles { catalog, grants })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn declared() -> Vec<RoleDescriptor> {
        vec![
            RoleDescriptor::new("admin").grant("action_1"),
            RoleDescriptor::new("client").deny("action_1").grant("action_2"),
        ]
    }

    fn names(perms: &[Permission]) -> Vec<&str> {
        perms.iter().map(|p| p.as_str()).collect()
    }

    #[test]
    fn resolves_catalog_and_grants() {
        let resolved = resolve_roles(&declared(), Some(&[])).unwrap();
        let catalog: Vec<&str> = resolved.catalog().iter().map(|(_, p)| p.as_str()).collect();

        assert_eq!(catalog, ["action_1", "action_2"]);
        assert_eq!(names(resolved.grants_of("admin").unwrap()), ["action_1"]);
        assert_eq!(names(resolved.grants_of("client").unwrap()), ["action_2"]);
        assert_eq!(resolved.grants_of(DEFAULT_ROLE).unwrap(), &[] as &[Permission]);
    }

    #[test]
    fn default_role_always_exists() {
        let resolved = resolve_roles(&[], None).unwrap();
        assert!(resolved.contains_role(DEFAULT_ROLE));
        assert!(resolved.catalog().is_empty());
    }

    #[test]
    fn default_grants_enter_catalog_and_are_granted() {
        let defaults = [Permission::new("read"), Permission::new("action_1")];
        let resolved = resolve_roles(&declared(), Some(&defaults)).unwrap();

        assert!(resolved.catalog().contains("read"));
        assert_eq!(names(resolved.grants_of(DEFAULT_ROLE).unwrap()), ["read", "action_1"]);
        assert_eq!(resolved.catalog().len(), 3);
    }

    #[test]
    fn explicit_default_role_is_used() {
        let roles = vec![RoleDescriptor::new(DEFAULT_ROLE).grant("read")];
        let resolved = resolve_roles(&roles, None).unwrap();
        assert_eq!(names(resolved.grants_of(DEFAULT_ROLE).unwrap()), ["read"]);
        assert_eq!(resolved.roles().count(), 1);

        let defaults = [Permission::new("read")];
        assert!(resolve_roles(&roles, Some(&defaults)).is_err());
    }

    #[test]
    fn duplicates_are_invalid() {
        let roles = vec![RoleDescriptor::new("a"), RoleDescriptor::new("a")];
        assert!(resolve_roles(&roles, None).is_err());

        let roles = vec![RoleDescriptor::new("a").grant("x").deny("x")];
        assert!(resolve_roles(&roles, None).is_err());
    }

    #[test]
    fn granted_ids_resolve_through_catalog() {
        let resolved = resolve_roles(&declared(), None).unwrap();
        let id_2 = resolved.catalog().id_of("action_2").unwrap();
        assert_eq!(resolved.granted_ids("client"), Some(vec![id_2]));
        assert_eq!(resolved.granted_ids("ghost"), None);
    }

    fn role_strategy() -> impl Strategy<Value = Vec<RoleDescriptor>> {
        let perms = prop::collection::btree_map("[a-e]", any::<bool>(), 0..5);
        prop::collection::btree_map("[a-z]{1,6}", perms, 0..6).prop_map(|roles| {
            roles
                .into_iter()
                .filter(|(name, _)| name != DEFAULT_ROLE)
                .map(|(name, perms)| {
                    perms
                        .into_iter()
                        .fold(RoleDescriptor::new(name), |r, (p, g)| r.with(p, g))
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: every granted permission is in the catalog, and every
        /// granted id names a catalog entry.
        #[test]
        fn catalog_is_closed_over_grants(roles in role_strategy()) {
            let resolved = resolve_roles(&roles, None).unwrap();
            for role in resolved.roles() {
                for perm in resolved.grants_of(role.as_str()).unwrap() {
                    prop_assert!(resolved.catalog().contains(perm.as_str()));
                }
                for id in resolved.granted_ids(role.as_str()).unwrap() {
                    prop_assert!(resolved.catalog().contains_id(id));
                }
            }
        }

        /// Property: resolution is a pure function of its input.
        #[test]
        fn resolution_is_deterministic(roles in role_strategy()) {
            let first = resolve_roles(&roles, None).unwrap();
            let second = resolve_roles(&roles, None).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
