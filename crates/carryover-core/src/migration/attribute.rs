//! Attribute specs: declarative per-column mapping rules.

use super::error::MigrationError;
use crate::catalog::Catalog;
use serde::{Deserialize, Serialize};

/// Delimiter used to split composite relation values.
pub const DEFAULT_DELIMITER: &str = ";";

/// How a legacy column relates to another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Plain value, copied as-is.
    #[default]
    None,
    /// Reference to one related record.
    ForeignKey,
    /// Reference to one related record that no other record may share.
    OneToOne,
    /// Delimited list of references to related records.
    ManyToMany,
}

impl RelationKind {
    /// Whether this column references other records.
    pub fn is_relation(self) -> bool {
        self != RelationKind::None
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelationKind::None => write!(f, "none"),
            RelationKind::ForeignKey => write!(f, "foreign_key"),
            RelationKind::OneToOne => write!(f, "one_to_one"),
            RelationKind::ManyToMany => write!(f, "many_to_many"),
        }
    }
}

/// A resolved, validated attribute spec.
///
/// For relation kinds, `attr` names the attribute of the related entity used
/// to look related records up. For plain values it names the target attribute
/// the column is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpec {
    target: Option<String>,
    attr: Option<String>,
    relation: RelationKind,
    delimiter: String,
    skip_missing: bool,
    exclude: bool,
}

impl AttributeSpec {
    /// Start a spec mapping onto `attr` of entity type `target`.
    pub fn is_a(target: impl Into<String>, attr: impl Into<String>) -> AttributeSpecBuilder {
        AttributeSpecBuilder {
            target: Some(target.into()),
            attr: Some(attr.into()),
            ..AttributeSpecBuilder::default()
        }
    }

    /// Start a spec that drops the column.
    pub fn excluded() -> AttributeSpecBuilder {
        AttributeSpecBuilder {
            exclude: true,
            ..AttributeSpecBuilder::default()
        }
    }

    /// Related or target entity type. `None` for excluded columns.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Lookup or target attribute. `None` for excluded columns.
    pub fn attr(&self) -> Option<&str> {
        self.attr.as_deref()
    }

    /// Relation kind.
    pub fn relation(&self) -> RelationKind {
        self.relation
    }

    /// Delimiter for composite and many-to-many values.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Whether unresolved related records are skipped instead of failing the row.
    pub fn skip_missing(&self) -> bool {
        self.skip_missing
    }

    /// Whether the column is dropped.
    pub fn is_excluded(&self) -> bool {
        self.exclude
    }

    /// The entity this spec makes its definition depend on.
    pub fn dependency(&self) -> Option<&str> {
        if self.relation.is_relation() {
            self.target()
        } else {
            None
        }
    }

    /// Lookup attributes, split on the delimiter for composite keys.
    pub fn lookup_attrs(&self) -> Vec<&str> {
        match self.attr() {
            Some(attr) => attr
                .split(self.delimiter.as_str())
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Unvalidated attribute spec input.
///
/// Built in code with [`AttributeSpec::is_a`] / [`AttributeSpec::excluded`],
/// or deserialized from a manifest, then checked with [`resolve`](Self::resolve).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSpecBuilder {
    /// Related or target entity type.
    pub target: Option<String>,
    /// Lookup or target attribute.
    pub attr: Option<String>,
    /// Foreign key flag.
    pub foreign_key: bool,
    /// One-to-one flag.
    pub one_to_one: bool,
    /// Many-to-many flag.
    pub many_to_many: bool,
    /// Delimiter for composite values.
    pub delimiter: String,
    /// Skip unresolved related records.
    pub skip_missing: bool,
    /// Drop the column.
    pub exclude: bool,
}

impl Default for AttributeSpecBuilder {
    fn default() -> Self {
        Self {
            target: None,
            attr: None,
            foreign_key: false,
            one_to_one: false,
            many_to_many: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
            skip_missing: false,
            exclude: false,
        }
    }
}

impl AttributeSpecBuilder {
    /// Mark as a foreign key.
    pub fn foreign_key(mut self) -> Self {
        self.foreign_key = true;
        self
    }

    /// Mark as a one-to-one relation.
    pub fn one_to_one(mut self) -> Self {
        self.one_to_one = true;
        self
    }

    /// Mark as a many-to-many relation.
    pub fn many_to_many(mut self) -> Self {
        self.many_to_many = true;
        self
    }

    /// Set the delimiter.
    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Skip unresolved related records instead of failing the row.
    pub fn skip_missing(mut self) -> Self {
        self.skip_missing = true;
        self
    }

    /// Validate against the catalog and normalize.
    pub fn resolve(self, catalog: &Catalog) -> Result<AttributeSpec, MigrationError> {
        let target = self.target.filter(|t| !t.trim().is_empty());
        let attr = self.attr.filter(|a| !a.trim().is_empty());

        let flags = [
            (self.foreign_key, RelationKind::ForeignKey),
            (self.one_to_one, RelationKind::OneToOne),
            (self.many_to_many, RelationKind::ManyToMany),
        ];
        let set: Vec<RelationKind> = flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, kind)| *kind)
            .collect();

        if self.exclude {
            if target.is_some() || attr.is_some() {
                return Err(MigrationError::configuration(
                    "an excluded attribute must not name a target type or attribute",
                ));
            }
            if !set.is_empty() {
                return Err(MigrationError::configuration(
                    "an excluded attribute cannot be a relation",
                ));
            }
            if self.skip_missing {
                return Err(MigrationError::configuration(
                    "an excluded attribute resolves nothing and cannot skip missing records",
                ));
            }
            return Ok(AttributeSpec {
                target: None,
                attr: None,
                relation: RelationKind::None,
                delimiter: self.delimiter,
                skip_missing: false,
                exclude: true,
            });
        }

        let (target, attr) = match (target, attr) {
            (Some(target), Some(attr)) => (target, attr),
            _ => {
                return Err(MigrationError::configuration(
                    "an attribute spec needs both a target type and an attribute name",
                ))
            }
        };

        if !catalog.contains(&target) {
            return Err(MigrationError::configuration(format!(
                "`{target}` is not a registered entity type"
            )));
        }

        if set.len() > 1 {
            let names: Vec<String> = set.iter().map(ToString::to_string).collect();
            return Err(MigrationError::configuration(format!(
                "an attribute can only have one relation kind, got {}",
                names.join(" and ")
            )));
        }

        if self.delimiter.is_empty() {
            return Err(MigrationError::configuration("the delimiter must not be empty"));
        }

        Ok(AttributeSpec {
            target: Some(target),
            attr: Some(attr),
            relation: set.first().copied().unwrap_or_default(),
            delimiter: self.delimiter,
            skip_missing: self.skip_missing,
            exclude: false,
        })
    }
}
