use warden_core::{IdentityId, Record, Value};
use warden_schema::{StorageSchema, StorageType};

/// Conjunction of column equalities. A null value matches only null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    terms: Record,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.insert(column, value.into());
        self
    }

    /// Match one principal by identity value.
    pub fn identity(schema: &StorageSchema, id: &IdentityId) -> Self {
        Self::new().eq(schema.identity_column(), identity_value(schema, id))
    }

    pub fn terms(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, row: &Record) -> bool {
        self.terms
            .iter()
            .all(|(column, value)| row.get_or_null(column).index_key() == value.index_key())
    }
}

impl From<Record> for Predicate {
    fn from(terms: Record) -> Self {
        Self { terms }
    }
}

/// Identity value shaped for the identity column.
///
/// Claims carry ids untyped, so a textual id that happens to parse as a UUID
/// is turned back into text for text columns (and vice versa).
pub fn identity_value(schema: &StorageSchema, id: &IdentityId) -> Value {
    let column_type = schema
        .entity
        .column(schema.identity_column())
        .map(|c| c.storage_type);
    match (column_type, id) {
        (Some(StorageType::Text), IdentityId::Uuid(u)) => Value::Text(u.to_string()),
        (Some(StorageType::Text), IdentityId::Int(i)) => Value::Text(i.to_string()),
        (Some(StorageType::Uuid), IdentityId::Text(s)) => s
            .parse::<uuid::Uuid>()
            .map(Value::Uuid)
            .unwrap_or_else(|_| Value::Text(s.clone())),
        _ => id.to_value(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_matches_only_null() {
        let p = Predicate::new().eq("email", Value::Null);
        assert!(p.matches(&Record::new().with("username", "bob")));
        assert!(!p.matches(&Record::new().with("email", "a@b.com")));
    }

    #[test]
    fn all_terms_must_match() {
        let row = Record::new().with("username", "bob").with("id", 1_i64);
        assert!(Predicate::new().eq("username", "bob").eq("id", 1_i64).matches(&row));
        assert!(!Predicate::new().eq("username", "bob").eq("id", 2_i64).matches(&row));
        assert!(Predicate::new().matches(&row));
    }
}
