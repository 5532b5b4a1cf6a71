//! Cross-field and transform validators synthesized per view.

use std::collections::BTreeSet;

use warden_core::{Record, ValidationError};

use crate::hash::HashTransform;

#[derive(Debug, Clone)]
pub enum ValidatorSpec {
    /// Exactly one of the named attributes must be non-null.
    RequiredXor(BTreeSet<String>),
    /// `transform` is applied to the submitted value before acceptance.
    HashTransform {
        field: String,
        transform: HashTransform,
    },
}

impl ValidatorSpec {
    pub fn xor_group(&self) -> Option<&BTreeSet<String>> {
        match self {
            ValidatorSpec::RequiredXor(group) => Some(group),
            ValidatorSpec::HashTransform { .. } => None,
        }
    }

    /// Whole-view check. Hash bindings are applied per field and always pass here.
    pub fn check(&self, record: &Record) -> Result<(), ValidationError> {
        let ValidatorSpec::RequiredXor(group) = self else {
            return Ok(());
        };

        let present = group
            .iter()
            .filter(|name| !record.get_or_null(name).is_null())
            .take(2)
            .count();

        match present {
            1 => Ok(()),
            0 => Err(ValidationError::FieldsRequired {
                group: group.iter().cloned().collect(),
            }),
            _ => Err(ValidationError::OnlyOneFieldRequired {
                group: group.iter().cloned().collect(),
            }),
        }
    }
}
