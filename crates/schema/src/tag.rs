//! Field-tag vocabulary: the metadata attached to entity attributes.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use warden_core::Value;

use crate::hash::HashTransform;

/// Semantic role an attribute plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// Uniquely identifies an entity instance; always the storage primary key.
    Identity,
    /// An external reachable address (email, phone, ...).
    Contact,
    /// Participates in the login submission.
    Login,
    /// Participates in the registration submission.
    Register,
    /// Part of the general entity view.
    Base,
}

impl TagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TagKind::Identity => "identity",
            TagKind::Contact => "contact",
            TagKind::Login => "login",
            TagKind::Register => "register",
            TagKind::Base => "base",
        }
    }
}

impl core::fmt::Display for TagKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tag instance on an attribute.
///
/// Construct with the per-kind constructors, which carry that kind's
/// defaults, then refine with the builder methods:
///
/// ```
/// use warden_schema::{FieldTag, HashTransform};
///
/// let tag = FieldTag::register()
///     .xor(["email", "phone"])
///     .hash(HashTransform::sha256());
/// assert!(!tag.required);
/// ```
#[derive(Debug, Clone)]
pub struct FieldTag {
    pub kind: TagKind,
    pub required: bool,
    pub default: Option<Value>,
    /// Sibling attributes of which, together with this one, exactly one must be present.
    pub required_xor: BTreeSet<String>,
    pub hash_transform: Option<HashTransform>,
    /// Only meaningful on `Contact` tags.
    pub confirm_required: bool,
}

impl FieldTag {
    fn of(kind: TagKind, required: bool) -> Self {
        Self {
            kind,
            required,
            default: None,
            required_xor: BTreeSet::new(),
            hash_transform: None,
            confirm_required: false,
        }
    }

    pub fn identity() -> Self {
        Self::of(TagKind::Identity, true)
    }

    /// Contacts are optional by default.
    pub fn contact() -> Self {
        Self::of(TagKind::Contact, false)
    }

    pub fn login() -> Self {
        Self::of(TagKind::Login, true)
    }

    pub fn register() -> Self {
        Self::of(TagKind::Register, true)
    }

    pub fn base() -> Self {
        Self::of(TagKind::Base, true)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Declaring a default makes the field optional.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self.required = false;
        self
    }

    /// Tie this attribute to `siblings` in an xor-required group.
    ///
    /// The field becomes individually optional. Ignored on `Contact` tags.
    pub fn xor<I, S>(mut self, siblings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.kind == TagKind::Contact {
            return self;
        }
        self.required_xor = siblings.into_iter().map(Into::into).collect();
        if !self.required_xor.is_empty() {
            self.required = false;
            self.default = None;
        }
        self
    }

    pub fn hash(mut self, transform: HashTransform) -> Self {
        self.hash_transform = Some(transform);
        self
    }

    /// Contact requires confirmation; storage gains a `<name>_confirmed` flag.
    pub fn confirm(mut self) -> Self {
        self.confirm_required = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults() {
        assert!(FieldTag::login().required);
        assert!(FieldTag::register().required);
        assert!(FieldTag::base().required);
        assert!(!FieldTag::contact().required);
    }

    #[test]
    fn default_makes_optional() {
        let tag = FieldTag::base().default_value("empty");
        assert!(!tag.required);
        assert_eq!(tag.default, Some(Value::Text("empty".into())));
    }

    #[test]
    fn xor_makes_optional_and_clears_default() {
        let tag = FieldTag::login().default_value("x").xor(["email"]);
        assert!(!tag.required);
        assert!(tag.default.is_none());
        assert!(tag.required_xor.contains("email"));
    }

    #[test]
    fn contact_ignores_xor() {
        let tag = FieldTag::contact().xor(["email"]).confirm();
        assert!(tag.required_xor.is_empty());
        assert!(tag.confirm_required);
    }
}
