//! Identity identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Value of an entity's identity attribute.
///
/// The identity attribute may be an integer (auto-increment), an opaque UUID
/// (randomly generated) or caller-supplied text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentityId {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl IdentityId {
    /// Convert a stored attribute value into an identity, if it can be one.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Uuid(u) => Some(Self::Uuid(*u)),
            Value::Text(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            IdentityId::Int(i) => Value::Int(*i),
            IdentityId::Uuid(u) => Value::Uuid(*u),
            IdentityId::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl core::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IdentityId::Int(i) => core::fmt::Display::fmt(i, f),
            IdentityId::Uuid(u) => core::fmt::Display::fmt(u, f),
            IdentityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for IdentityId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<Uuid> for IdentityId {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<IdentityId> for Value {
    fn from(value: IdentityId) -> Self {
        value.to_value()
    }
}

impl FromStr for IdentityId {
    type Err = core::convert::Infallible;

    /// Integers and UUIDs are recognized; anything else is kept as text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Self::Int(i));
        }
        if let Ok(u) = Uuid::from_str(s) {
            return Ok(Self::Uuid(u));
        }
        Ok(Self::Text(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_serde_keeps_native_shape() {
        let id = IdentityId::Int(5);
        assert_eq!(serde_json::to_string(&id).unwrap(), "5");

        let uuid = Uuid::now_v7();
        let parsed: IdentityId = serde_json::from_str(&format!("\"{uuid}\"")).unwrap();
        assert_eq!(parsed, IdentityId::Uuid(uuid));

        let parsed: IdentityId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(parsed, IdentityId::Text("alice".into()));
    }

    #[test]
    fn round_trips_through_value() {
        let id = IdentityId::Text("bob".into());
        assert_eq!(IdentityId::from_value(&id.to_value()), Some(id));
        assert_eq!(IdentityId::from_value(&Value::Bool(true)), None);
    }
}
