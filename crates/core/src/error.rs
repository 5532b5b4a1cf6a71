//! Error taxonomy shared by every layer.

use thiserror::Error;

use crate::value::ValueType;

/// Declarative input violates a structural invariant.
///
/// Only raised while building descriptors, views, storage schemas and role
/// catalogs. Fatal: callers are expected to abort startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

impl ModelError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidModel(msg.into())
    }
}

/// An operation was invoked with contractually insufficient or ambiguous arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid arguments: {0}")]
pub struct ArgumentsError(pub String);

impl ArgumentsError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Why a single field was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    /// Required field absent (or null) in the submission.
    Missing,
    /// Submitted JSON value has the wrong shape for the declared type.
    WrongType { expected: ValueType },
    /// Right shape, bad content (malformed email, unparsable date, ...).
    InvalidFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub kind: FieldErrorKind,
}

impl FieldError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::Missing,
        }
    }

    pub fn wrong_type(field: impl Into<String>, expected: ValueType) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::WrongType { expected },
        }
    }

    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: FieldErrorKind::InvalidFormat(reason.into()),
        }
    }
}

impl core::fmt::Display for FieldError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            FieldErrorKind::Missing => write!(f, "{}: field required", self.field),
            FieldErrorKind::WrongType { expected } => {
                write!(f, "{}: expected {}", self.field, expected)
            }
            FieldErrorKind::InvalidFormat(reason) => write!(f, "{}: {}", self.field, reason),
        }
    }
}

/// Submitted data failed a field or cross-field rule.
///
/// Recoverable: surfaced to the caller as a rejection, never fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid fields: {}", render_fields(.0))]
    Fields(Vec<FieldError>),

    /// None of the members of an xor-required group was submitted.
    #[error("fields required")]
    FieldsRequired { group: Vec<String> },

    /// More than one member of an xor-required group was submitted.
    #[error("only one field required")]
    OnlyOneFieldRequired { group: Vec<String> },
}

impl ValidationError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Fields(_) => "invalid_fields",
            ValidationError::FieldsRequired { .. } => "fields_required",
            ValidationError::OnlyOneFieldRequired { .. } => "only_one_field_required",
        }
    }
}

fn render_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_failures_render_stable_messages() {
        let none = ValidationError::FieldsRequired {
            group: vec!["email".into(), "username".into()],
        };
        let many = ValidationError::OnlyOneFieldRequired {
            group: vec!["email".into(), "username".into()],
        };

        assert_eq!(none.to_string(), "fields required");
        assert_eq!(many.to_string(), "only one field required");
        assert_ne!(none.code(), many.code());
    }

    #[test]
    fn field_errors_are_listed() {
        let err = ValidationError::Fields(vec![
            FieldError::missing("password"),
            FieldError::wrong_type("id", ValueType::Int),
        ]);

        let msg = err.to_string();
        assert!(msg.contains("password: field required"));
        assert!(msg.contains("id: expected int"));
    }
}
