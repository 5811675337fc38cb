//! Record type for stored values.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Attribute values of a record or draft.
pub type Fields = BTreeMap<String, Value>;

/// A stored target record with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Store-assigned id, unique per entity type.
    pub id: u64,

    /// Entity type name.
    pub entity: String,

    /// Attribute values.
    pub fields: Fields,

    /// Creation timestamp in microseconds since Unix epoch.
    pub created_at: u64,

    /// Last update timestamp in microseconds since Unix epoch.
    pub updated_at: u64,
}

impl Record {
    /// Create a new record with the current timestamp.
    pub fn new(entity: impl Into<String>, id: u64, fields: Fields) -> Self {
        let now = super::key::current_timestamp();
        Self {
            id,
            entity: entity.into(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this record carrying new fields and a fresh update timestamp.
    pub fn with_fields(&self, fields: Fields) -> Self {
        Self {
            id: self.id,
            entity: self.entity.clone(),
            fields,
            created_at: self.created_at,
            updated_at: super::key::current_timestamp(),
        }
    }

    /// Get an attribute value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Check whether every criterion matches this record.
    pub fn matches(&self, criteria: &[(&str, Value)]) -> bool {
        criteria.iter().all(|(field, expected)| {
            self.fields
                .get(*field)
                .is_some_and(|actual| values_match(actual, expected))
        })
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Compare two values by their textual form. Nulls never match.
pub fn values_match(a: &Value, b: &Value) -> bool {
    match (lookup_text(a), lookup_text(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub(crate) fn lookup_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn author() -> Record {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), json!(7));
        fields.insert("email".to_string(), json!("ada@example.org"));
        Record::new("Author", 1, fields)
    }

    #[test]
    fn test_bytes_roundtrip() {
        let record = author();
        let decoded = Record::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn test_matches_across_types() {
        let record = author();
        assert!(record.matches(&[("id", json!("7"))]));
        assert!(record.matches(&[("id", json!(7)), ("email", json!("ada@example.org"))]));
        assert!(!record.matches(&[("id", json!(8))]));
        assert!(!record.matches(&[("missing", json!(7))]));
    }

    #[test]
    fn test_null_never_matches() {
        assert!(!values_match(&Value::Null, &Value::Null));
        assert!(!values_match(&json!(1), &Value::Null));
    }

    #[test]
    fn test_with_fields_keeps_identity() {
        let record = author();
        let updated = record.with_fields(Fields::new());
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.created_at, record.created_at);
        assert!(updated.fields.is_empty());
    }
}
