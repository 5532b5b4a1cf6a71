use std::borrow::{Borrow, Cow};
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "action_1").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Permission {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Stable numeric id of a permission inside a [`PermissionCatalog`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(i64);

impl PermissionId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The canonical set of permission names, each with a stable numeric id.
///
/// Ids are assigned `1..=n` in insertion order. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCatalog {
    entries: Vec<Permission>,
    ids: HashMap<Permission, PermissionId>,
}

impl PermissionCatalog {
    /// Build from names in first-mention order; repeats are ignored.
    pub fn from_names<I>(names: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        let mut catalog = Self::default();
        for name in names {
            if catalog.ids.contains_key(&name) {
                continue;
            }
            let id = PermissionId::new(catalog.entries.len() as i64 + 1);
            catalog.ids.insert(name.clone(), id);
            catalog.entries.push(name);
        }
        catalog
    }

    pub fn id_of(&self, name: &str) -> Option<PermissionId> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: PermissionId) -> Option<&Permission> {
        let idx = usize::try_from(id.get().checked_sub(1)?).ok()?;
        self.entries.get(idx)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.id_of(name).is_some()
    }

    pub fn contains_id(&self, id: PermissionId) -> bool {
        self.name_of(id).is_some()
    }

    /// `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PermissionId, &Permission)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, p)| (PermissionId::new(i as i64 + 1), p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
