//! Typed views (Base / Login / Register) derived from an entity descriptor.
//!
//! A view is built once and shared read-only. Validating a submission runs in
//! a fixed order: per-field checks and hash transforms first, then whole-view
//! xor checks, which only run once every field has passed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;
use warden_core::{
    CoerceError, FieldError, Record, ValidationError, Value, ValueType,
};

use crate::descriptor::{Attribute, EntityDescriptor};
use crate::hash::HashTransform;
use crate::tag::{FieldTag, TagKind};
use crate::validator::ValidatorSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Base,
    Login,
    Register,
}

impl ViewKind {
    pub fn tag_kind(self) -> TagKind {
        match self {
            ViewKind::Base => TagKind::Base,
            ViewKind::Login => TagKind::Login,
            ViewKind::Register => TagKind::Register,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Base => "base",
            ViewKind::Login => "login",
            ViewKind::Register => "register",
        }
    }
}

/// One attribute as seen through a view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewField {
    pub name: String,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SchemaView {
    kind: ViewKind,
    fields: Vec<ViewField>,
    validators: Vec<ValidatorSpec>,
    hashes: BTreeMap<String, HashTransform>,
}

impl SchemaView {
    pub fn build(descriptor: &EntityDescriptor, kind: ViewKind) -> Self {
        let tag_kind = kind.tag_kind();
        let mut fields = Vec::new();
        let mut xor_groups: Vec<BTreeSet<String>> = Vec::new();
        let mut hashes = BTreeMap::new();

        for attr in descriptor.attributes() {
            let Some(field) = project(attr, kind) else {
                continue;
            };

            if let Some(tag) = attr.tag(tag_kind) {
                if !tag.required_xor.is_empty() {
                    let mut group = tag.required_xor.clone();
                    group.insert(attr.name.clone());
                    if !xor_groups.contains(&group) {
                        xor_groups.push(group);
                    }
                }
                if let Some(transform) = &tag.hash_transform {
                    hashes.insert(attr.name.clone(), transform.clone());
                }
            }

            fields.push(field);
        }

        let validators: Vec<ValidatorSpec> = xor_groups
            .into_iter()
            .map(ValidatorSpec::RequiredXor)
            .chain(hashes.iter().map(|(field, transform)| ValidatorSpec::HashTransform {
                field: field.clone(),
                transform: transform.clone(),
            }))
            .collect();

        debug!(
            entity = descriptor.name(),
            view = kind.as_str(),
            fields = fields.len(),
            validators = validators.len(),
            "schema view built"
        );

        Self {
            kind,
            fields,
            validators,
            hashes,
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn fields(&self) -> &[ViewField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&ViewField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn validators(&self) -> &[ValidatorSpec] {
        &self.validators
    }

    pub fn xor_groups(&self) -> impl Iterator<Item = &BTreeSet<String>> {
        self.validators.iter().filter_map(ValidatorSpec::xor_group)
    }

    /// Hash transform bound to `field` in this view, if any.
    pub fn transform(&self, field: &str) -> Option<&HashTransform> {
        self.hashes.get(field)
    }

    /// Validate a JSON submission and produce the view's internal representation.
    ///
    /// Every view field is present in the result; absent optional fields hold
    /// their default or null. Hash-transformed fields hold the transformed value.
    pub fn validate(&self, submission: &JsonValue) -> Result<Record, ValidationError> {
        let Some(object) = submission.as_object() else {
            return Err(ValidationError::Fields(vec![FieldError::invalid_format(
                "$",
                "submission must be a JSON object",
            )]));
        };

        let mut record = Record::new();
        let mut errors = Vec::new();

        for field in &self.fields {
            match self.check_field(field, object.get(&field.name)) {
                Ok(value) => {
                    record.insert(field.name.clone(), value);
                }
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(ValidationError::Fields(errors));
        }

        for validator in &self.validators {
            validator.check(&record)?;
        }

        Ok(record)
    }

    /// Project a stored row through this view.
    ///
    /// Stored values are taken as-is: transforms were applied once at
    /// acceptance and are never re-applied on read.
    pub fn materialize(&self, row: &Record) -> Record {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), row.get_or_null(&f.name).clone()))
            .collect()
    }

    fn check_field(&self, field: &ViewField, raw: Option<&JsonValue>) -> Result<Value, FieldError> {
        let raw = match raw {
            None | Some(JsonValue::Null) => {
                if field.required {
                    return Err(FieldError::missing(&field.name));
                }
                return Ok(field.default.clone().unwrap_or(Value::Null));
            }
            Some(raw) => raw,
        };

        let value = field.value_type.coerce(raw).map_err(|e| match e {
            CoerceError::WrongType => FieldError::wrong_type(&field.name, field.value_type),
            CoerceError::Format(reason) => FieldError::invalid_format(&field.name, reason),
        })?;

        match (self.hashes.get(&field.name), &value) {
            (Some(transform), Value::Text(text)) => Ok(Value::Text(transform.apply(text))),
            _ => Ok(value),
        }
    }
}

/// Include an attribute iff it carries a tag of the view's kind. The Base view
/// also takes untagged attributes that declare a plain default.
fn project(attr: &Attribute, kind: ViewKind) -> Option<ViewField> {
    match attr.tag(kind.tag_kind()) {
        Some(tag) => Some(resolve_field(attr, tag)),
        None if kind == ViewKind::Base && attr.is_untagged() => {
            attr.default.as_ref().map(|default| ViewField {
                name: attr.name.clone(),
                value_type: attr.value_type,
                required: false,
                default: Some(default.clone()),
            })
        }
        None => None,
    }
}

fn resolve_field(attr: &Attribute, tag: &FieldTag) -> ViewField {
    let (required, default) = if let Some(default) = &tag.default {
        (false, Some(default.clone()))
    } else if !tag.required_xor.is_empty() {
        (false, None)
    } else {
        (tag.required, None)
    };

    ViewField {
        name: attr.name.clone(),
        value_type: attr.value_type,
        required,
        default,
    }
}

/// The three views of one entity, built together.
#[derive(Debug, Clone)]
pub struct SchemaViews {
    pub base: SchemaView,
    pub login: SchemaView,
    pub register: SchemaView,
}

impl SchemaViews {
    pub fn build(descriptor: &EntityDescriptor) -> Self {
        Self {
            base: SchemaView::build(descriptor, ViewKind::Base),
            login: SchemaView::build(descriptor, ViewKind::Login),
            register: SchemaView::build(descriptor, ViewKind::Register),
        }
    }

    pub fn get(&self, kind: ViewKind) -> &SchemaView {
        match kind {
            ViewKind::Base => &self.base,
            ViewKind::Login => &self.login,
            ViewKind::Register => &self.register,
        }
    }
}
