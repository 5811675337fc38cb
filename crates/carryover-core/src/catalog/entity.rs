//! Entity definitions.

use serde::{Deserialize, Serialize};

/// A target entity type.
///
/// An empty field list means the entity accepts any attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Entity name (unique within the catalog).
    pub name: String,
    /// Declared attributes.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl EntityDef {
    /// Create a new entity definition without declared fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declare a field on the entity.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Declare multiple fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Whether the entity restricts its attributes to a declared set.
    pub fn is_strict(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Check if the entity accepts the given attribute.
    pub fn accepts(&self, field: &str) -> bool {
        !self.is_strict() || self.fields.iter().any(|f| f == field)
    }
}
