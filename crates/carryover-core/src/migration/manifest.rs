//! JSON manifest discovery source.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::attribute::AttributeSpecBuilder;
use super::definition::MigrationDefinition;
use super::error::MigrationError;
use super::registry::DiscoverySource;
use crate::catalog::{Catalog, EntityDef};
use crate::error::Error;

/// A manifest file declaring the target entities and migration roots.
///
/// Definitions declared in a manifest run with [`NoopHooks`](super::NoopHooks);
/// definitions that need hooks are registered in code with a
/// [`StaticManifest`](super::StaticManifest).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Target entity types.
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    /// Roots loaded without an explicit include.
    #[serde(default)]
    pub installed: Vec<String>,
    /// Definitions per root.
    #[serde(default)]
    pub roots: BTreeMap<String, Vec<DefinitionEntry>>,
}

/// One migration definition in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionEntry {
    /// Stable definition id.
    pub id: String,
    /// Target entity type.
    pub target: String,
    /// Legacy query.
    #[serde(default)]
    pub query: String,
    /// Identity attribute for update detection.
    #[serde(default)]
    pub identity: Option<String>,
    /// Explicit dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Abstract base flag.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Column specs.
    #[serde(default)]
    pub columns: Vec<ColumnEntry>,
}

/// A column spec in a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEntry {
    /// Legacy column name.
    pub column: String,
    /// The unresolved spec.
    #[serde(flatten)]
    pub spec: AttributeSpecBuilder,
}

impl ManifestFile {
    /// Load a manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a manifest from JSON text.
    pub fn parse(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Catalog built from the declared entities.
    pub fn catalog(&self) -> Catalog {
        self.entities.iter().cloned().collect()
    }
}

impl DefinitionEntry {
    fn build(&self, catalog: &Catalog) -> Result<MigrationDefinition, MigrationError> {
        if !catalog.contains(&self.target) {
            return Err(MigrationError::configuration(format!(
                "migration {} targets `{}`, which is not a registered entity type",
                self.id, self.target
            )));
        }

        let mut definition =
            MigrationDefinition::new(self.id.as_str(), self.target.as_str()).with_query(self.query.as_str());
        for entity in &self.depends_on {
            definition = definition.depends_on(entity.as_str());
        }
        if let Some(identity) = &self.identity {
            definition = definition.with_identity(identity.as_str());
        }
        for column in &self.columns {
            let spec = column.spec.clone().resolve(catalog).map_err(|e| match e {
                MigrationError::Configuration { message } => MigrationError::configuration(format!(
                    "{}.{}: {message}",
                    self.id, column.column
                )),
                other => other,
            })?;
            definition = definition.with_column(column.column.as_str(), spec);
        }
        if self.is_abstract {
            definition = definition.into_abstract();
        }
        Ok(definition)
    }
}

impl DiscoverySource for ManifestFile {
    fn installed_roots(&self) -> Vec<String> {
        self.installed.clone()
    }

    fn list_definitions(
        &self,
        root: &str,
        catalog: &Catalog,
    ) -> Result<Option<Vec<MigrationDefinition>>, MigrationError> {
        match self.roots.get(root) {
            Some(entries) => entries
                .iter()
                .map(|entry| entry.build(catalog))
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            None => Ok(None),
        }
    }
}
