//! Entity descriptor parsing.
//!
//! A single canonical parser turns the raw tagged-attribute list into an
//! [`EntityDescriptor`]; both the view builder and the storage builder consume
//! the descriptor, never the raw declaration.

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};
use warden_core::{ModelError, Value, ValueType};

use crate::tag::{FieldTag, TagKind};

/// Raw declaration of one attribute: name, declared type, tags.
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: String,
    pub value_type: ValueType,
    pub tags: Vec<FieldTag>,
    /// Plain default for attributes that carry no tag at all.
    pub default: Option<Value>,
}

impl AttributeDecl {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            tags: Vec::new(),
            default: None,
        }
    }

    pub fn tag(mut self, tag: FieldTag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Caller-configured parse behavior.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Identity convention used when no attribute carries an `Identity` tag.
    /// Without it, a missing identity is an `InvalidModel`.
    pub fallback_identity: Option<(String, ValueType)>,
}

impl ParseOptions {
    /// Fall back to `id: Int` when no identity is tagged.
    pub fn with_default_fallback() -> Self {
        Self {
            fallback_identity: Some(("id".to_string(), ValueType::Int)),
        }
    }
}

/// A validated attribute with at most one tag per kind.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub value_type: ValueType,
    pub default: Option<Value>,
    tags: BTreeMap<TagKind, FieldTag>,
}

impl Attribute {
    pub fn tag(&self, kind: TagKind) -> Option<&FieldTag> {
        self.tags.get(&kind)
    }

    pub fn has_tag(&self, kind: TagKind) -> bool {
        self.tags.contains_key(&kind)
    }

    pub fn is_untagged(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &FieldTag> {
        self.tags.values()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityAttribute {
    pub name: String,
    pub value_type: ValueType,
    /// `false` when the identity came from the fallback convention and is not
    /// one of the declared attributes.
    pub declared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactAttribute {
    pub name: String,
    pub confirm_required: bool,
}

impl ContactAttribute {
    /// Name of the derived storage flag for contacts that require confirmation.
    pub fn confirmed_column(&self) -> String {
        format!("{}_confirmed", self.name)
    }
}

/// Canonical, validated description of an entity.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    name: String,
    attributes: Vec<Attribute>,
    identity: IdentityAttribute,
    contacts: Vec<ContactAttribute>,
}

impl EntityDescriptor {
    /// Parse and validate a raw attribute list.
    ///
    /// Fails with `InvalidModel` on any structural violation.
    pub fn parse(
        name: impl Into<String>,
        declarations: Vec<AttributeDecl>,
        options: &ParseOptions,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ModelError::invalid("entity name must not be empty"));
        }

        let mut seen = HashSet::new();
        for decl in &declarations {
            if !seen.insert(decl.name.as_str()) {
                return Err(ModelError::invalid(format!(
                    "attribute '{}' declared more than once",
                    decl.name
                )));
            }
        }

        let mut attributes = Vec::with_capacity(declarations.len());
        for decl in declarations {
            attributes.push(resolve_attribute(decl)?);
        }

        let identity = resolve_identity(&attributes, options)?;

        let names = seen_names(&attributes);
        for attr in &attributes {
            check_attribute(attr, &names)?;
        }

        let contacts: Vec<ContactAttribute> = attributes
            .iter()
            .filter_map(|a| {
                a.tag(TagKind::Contact).map(|t| ContactAttribute {
                    name: a.name.clone(),
                    confirm_required: t.confirm_required,
                })
            })
            .collect();

        info!(
            entity = %name,
            attributes = attributes.len(),
            identity = %identity.name,
            contacts = contacts.len(),
            "entity descriptor resolved"
        );

        Ok(Self {
            name,
            attributes,
            identity,
            contacts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn identity(&self) -> &IdentityAttribute {
        &self.identity
    }

    /// Contact attributes in declaration order.
    pub fn contacts(&self) -> &[ContactAttribute] {
        &self.contacts
    }
}

fn seen_names(attributes: &[Attribute]) -> HashSet<&str> {
    attributes.iter().map(|a| a.name.as_str()).collect()
}

fn resolve_attribute(decl: AttributeDecl) -> Result<Attribute, ModelError> {
    let mut tags = BTreeMap::new();
    for tag in decl.tags {
        let kind = tag.kind;
        if tags.insert(kind, tag).is_some() {
            return Err(ModelError::invalid(format!(
                "attribute '{}' carries more than one '{}' tag",
                decl.name, kind
            )));
        }
    }
    Ok(Attribute {
        name: decl.name,
        value_type: decl.value_type,
        default: decl.default,
        tags,
    })
}

fn resolve_identity(
    attributes: &[Attribute],
    options: &ParseOptions,
) -> Result<IdentityAttribute, ModelError> {
    let tagged: Vec<&Attribute> = attributes
        .iter()
        .filter(|a| a.has_tag(TagKind::Identity))
        .collect();

    let identity = match tagged.as_slice() {
        [one] => IdentityAttribute {
            name: one.name.clone(),
            value_type: one.value_type,
            declared: true,
        },
        [] => {
            let Some((name, value_type)) = &options.fallback_identity else {
                return Err(ModelError::invalid("identity attribute required"));
            };
            debug!(identity = %name, "no identity tagged, using fallback convention");
            match attributes.iter().find(|a| &a.name == name) {
                Some(existing) => IdentityAttribute {
                    name: existing.name.clone(),
                    value_type: existing.value_type,
                    declared: true,
                },
                None => IdentityAttribute {
                    name: name.clone(),
                    value_type: *value_type,
                    declared: false,
                },
            }
        }
        many => {
            let names: Vec<&str> = many.iter().map(|a| a.name.as_str()).collect();
            return Err(ModelError::invalid(format!(
                "exactly one identity attribute allowed, found {}: {:?}",
                names.len(),
                names
            )));
        }
    };

    match identity.value_type {
        ValueType::Int | ValueType::Uuid | ValueType::Str | ValueType::Email | ValueType::Phone => {
            Ok(identity)
        }
        other => Err(ModelError::invalid(format!(
            "identity attribute '{}' cannot have type {other}",
            identity.name
        ))),
    }
}

fn check_attribute(attr: &Attribute, names: &HashSet<&str>) -> Result<(), ModelError> {
    for tag in attr.tags() {
        if tag.hash_transform.is_some() && !attr.value_type.is_textual() {
            return Err(ModelError::invalid(format!(
                "attribute '{}' of type {} cannot carry a hash transform",
                attr.name, attr.value_type
            )));
        }

        if tag.required_xor.is_empty() {
            continue;
        }
        if tag.required_xor.iter().all(|s| s == &attr.name) {
            return Err(ModelError::invalid(format!(
                "xor group on '{}' must name at least one sibling",
                attr.name
            )));
        }
        if let Some(unknown) = tag.required_xor.iter().find(|s| !names.contains(s.as_str())) {
            return Err(ModelError::invalid(format!(
                "xor group on '{}' names unknown attribute '{}'",
                attr.name, unknown
            )));
        }
    }
    Ok(())
}
