//! Attribute value model.
//!
//! Entity attributes are declared with a [`ValueType`]; submitted JSON is
//! coerced into a [`Value`] of that type by the per-field checks.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Declared type of an entity attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int,
    Bool,
    Str,
    Uuid,
    Float,
    DateTime,
    Time,
    Date,
    Email,
    Phone,
    Json,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::Str => "str",
            ValueType::Uuid => "uuid",
            ValueType::Float => "float",
            ValueType::DateTime => "datetime",
            ValueType::Time => "time",
            ValueType::Date => "date",
            ValueType::Email => "email",
            ValueType::Phone => "phone",
            ValueType::Json => "json",
        }
    }

    /// Types whose values are carried as text (and can therefore be hashed).
    pub fn is_textual(self) -> bool {
        matches!(self, ValueType::Str | ValueType::Email | ValueType::Phone)
    }

    /// Coerce a non-null submitted JSON value into this type.
    ///
    /// The error is a short, human readable reason; the caller attaches the
    /// field name.
    pub fn coerce(self, raw: &JsonValue) -> Result<Value, CoerceError> {
        match self {
            ValueType::Int => match raw {
                JsonValue::Number(n) => n.as_i64().map(Value::Int).ok_or(CoerceError::WrongType),
                JsonValue::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| CoerceError::WrongType),
                _ => Err(CoerceError::WrongType),
            },
            ValueType::Bool => raw.as_bool().map(Value::Bool).ok_or(CoerceError::WrongType),
            ValueType::Float => raw.as_f64().map(Value::Float).ok_or(CoerceError::WrongType),
            ValueType::Str => Ok(Value::Text(expect_str(raw)?.to_string())),
            ValueType::Uuid => Uuid::parse_str(expect_str(raw)?)
                .map(Value::Uuid)
                .map_err(|e| CoerceError::Format(format!("invalid uuid ({e})"))),
            ValueType::DateTime => DateTime::parse_from_rfc3339(expect_str(raw)?)
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc)))
                .map_err(|e| CoerceError::Format(format!("invalid datetime ({e})"))),
            ValueType::Date => NaiveDate::from_str(expect_str(raw)?)
                .map(Value::Date)
                .map_err(|e| CoerceError::Format(format!("invalid date ({e})"))),
            ValueType::Time => NaiveTime::from_str(expect_str(raw)?)
                .map(Value::Time)
                .map_err(|e| CoerceError::Format(format!("invalid time ({e})"))),
            ValueType::Email => {
                let s = expect_str(raw)?;
                if is_email(s) {
                    Ok(Value::Text(s.to_string()))
                } else {
                    Err(CoerceError::Format("value is not a valid email address".into()))
                }
            }
            ValueType::Phone => {
                let s = expect_str(raw)?;
                if is_phone(s) {
                    Ok(Value::Text(s.to_string()))
                } else {
                    Err(CoerceError::Format("value is not a valid phone number".into()))
                }
            }
            ValueType::Json => Ok(Value::Json(raw.clone())),
        }
    }
}

impl core::fmt::Display for ValueType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to coerce a submitted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoerceError {
    WrongType,
    Format(String),
}

fn expect_str(raw: &JsonValue) -> Result<&str, CoerceError> {
    raw.as_str().ok_or(CoerceError::WrongType)
}

fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

fn is_phone(s: &str) -> bool {
    let body = s.strip_prefix('+').unwrap_or(s);
    let mut digits = 0usize;
    for c in body.chars() {
        match c {
            '0'..='9' => digits += 1,
            ' ' | '-' | '(' | ')' | '.' => {}
            _ => return false,
        }
    }
    (7..=15).contains(&digits)
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Bool(bool),
    Text(String),
    Uuid(Uuid),
    Float(f64),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Int(i) => JsonValue::from(*i),
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Uuid(u) => JsonValue::String(u.to_string()),
            Value::Float(f) => JsonValue::from(*f),
            Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            Value::Date(d) => JsonValue::String(d.to_string()),
            Value::Time(t) => JsonValue::String(t.to_string()),
            Value::Json(j) => j.clone(),
        }
    }

    /// Canonical text key used for equality lookups and unique indexes.
    pub fn index_key(&self) -> String {
        match self {
            Value::Text(s) => format!("s:{s}"),
            other => format!("j:{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

/// Attribute name → value, ordered by attribute name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(name.into(), value)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Value of `name`, treating absence as null.
    pub fn get_or_null(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&Value::Null)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A copy without null entries.
    pub fn without_nulls(&self) -> Record {
        Record {
            values: self
                .values
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_scalars() {
        assert_eq!(ValueType::Int.coerce(&json!(7)).unwrap(), Value::Int(7));
        assert_eq!(ValueType::Int.coerce(&json!("42")).unwrap(), Value::Int(42));
        assert_eq!(ValueType::Bool.coerce(&json!(true)).unwrap(), Value::Bool(true));
        assert_eq!(
            ValueType::Str.coerce(&json!("bob")).unwrap(),
            Value::Text("bob".into())
        );
        assert_eq!(ValueType::Int.coerce(&json!("x")), Err(CoerceError::WrongType));
        assert_eq!(ValueType::Str.coerce(&json!(1)), Err(CoerceError::WrongType));
    }

    #[test]
    fn email_format_is_checked() {
        assert!(ValueType::Email.coerce(&json!("a@b.com")).is_ok());
        assert!(matches!(
            ValueType::Email.coerce(&json!("not-an-email")),
            Err(CoerceError::Format(_))
        ));
        assert!(ValueType::Email.coerce(&json!("a@b")).is_err());
        assert!(ValueType::Email.coerce(&json!("a b@c.org")).is_err());
    }

    #[test]
    fn phone_format_is_checked() {
        assert!(ValueType::Phone.coerce(&json!("+1 (555) 123-4567")).is_ok());
        assert!(ValueType::Phone.coerce(&json!("12345")).is_err());
        assert!(ValueType::Phone.coerce(&json!("555-CALL-NOW")).is_err());
    }

    #[test]
    fn temporal_values_parse_from_strings() {
        assert!(matches!(
            ValueType::DateTime.coerce(&json!("2024-05-01T10:00:00Z")),
            Ok(Value::DateTime(_))
        ));
        assert!(matches!(
            ValueType::Date.coerce(&json!("2024-05-01")),
            Ok(Value::Date(_))
        ));
        assert!(matches!(
            ValueType::Time.coerce(&json!("10:30:00")),
            Ok(Value::Time(_))
        ));
        assert!(ValueType::Uuid.coerce(&json!("nope")).is_err());
    }

    #[test]
    fn record_serializes_as_object() {
        let record = Record::new().with("id", 1i64).with("name", "bob");
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"id": 1, "name": "bob"})
        );
        assert_eq!(record.without_nulls().len(), 2);
    }
}
