//! Migration discovery and registration.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use super::definition::MigrationDefinition;
use super::error::MigrationError;
use super::sorter::ExecutionPlan;
use crate::catalog::Catalog;

/// Lists migration definitions per root.
pub trait DiscoverySource {
    /// Roots installed by default, in discovery order.
    fn installed_roots(&self) -> Vec<String>;

    /// Definitions declared by a root.
    ///
    /// `Ok(None)` means the root exists but declares no migrations.
    fn list_definitions(
        &self,
        root: &str,
        catalog: &Catalog,
    ) -> Result<Option<Vec<MigrationDefinition>>, MigrationError>;
}

/// Builds the definitions of one root.
pub type DefinitionFactory = fn(&Catalog) -> Result<Vec<MigrationDefinition>, MigrationError>;

/// Discovery source whose roots are registered in code.
#[derive(Clone, Default)]
pub struct StaticManifest {
    installed: Vec<String>,
    factories: BTreeMap<String, DefinitionFactory>,
}

impl StaticManifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an installed root with its definition factory.
    pub fn register(mut self, root: impl Into<String>, factory: DefinitionFactory) -> Self {
        let root = root.into();
        if !self.installed.contains(&root) {
            self.installed.push(root.clone());
        }
        self.factories.insert(root, factory);
        self
    }

    /// Install a root that declares no migrations.
    pub fn install(mut self, root: impl Into<String>) -> Self {
        let root = root.into();
        if !self.installed.contains(&root) {
            self.installed.push(root);
        }
        self
    }
}

impl std::fmt::Debug for StaticManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticManifest")
            .field("installed", &self.installed)
            .finish_non_exhaustive()
    }
}

impl DiscoverySource for StaticManifest {
    fn installed_roots(&self) -> Vec<String> {
        self.installed.clone()
    }

    fn list_definitions(
        &self,
        root: &str,
        catalog: &Catalog,
    ) -> Result<Option<Vec<MigrationDefinition>>, MigrationError> {
        match self.factories.get(root) {
            Some(factory) => factory(catalog).map(Some),
            None => Ok(None),
        }
    }
}

/// Which roots to load beyond the installed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Extra roots to load.
    pub includes: Vec<String>,
    /// Roots to skip. Wins over installed and included roots.
    pub excludes: Vec<String>,
}

impl DiscoveryOptions {
    /// Add a root to include.
    pub fn include(mut self, root: impl Into<String>) -> Self {
        self.includes.push(root.into());
        self
    }

    /// Add a root to exclude.
    pub fn exclude(mut self, root: impl Into<String>) -> Self {
        self.excludes.push(root.into());
        self
    }
}

/// Holds every discovered migration definition.
pub struct MigrationRegistry {
    catalog: Catalog,
    definitions: Vec<MigrationDefinition>,
    loaded_roots: HashSet<String>,
}

impl MigrationRegistry {
    /// Create an empty registry resolving specs against `catalog`.
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            definitions: Vec::new(),
            loaded_roots: HashSet::new(),
        }
    }

    /// The catalog definitions are resolved against.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Load definitions from the roots of `source`.
    ///
    /// Returns the number of definitions added.
    pub fn discover(
        &mut self,
        source: &dyn DiscoverySource,
        options: &DiscoveryOptions,
    ) -> Result<usize, MigrationError> {
        let mut roots: Vec<String> = Vec::new();
        for root in source.installed_roots().into_iter().chain(options.includes.iter().cloned()) {
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
        roots.retain(|root| !options.excludes.contains(root));

        let mut added = 0;
        for root in roots {
            if self.loaded_roots.contains(&root) {
                debug!(root = %root, "Root already loaded");
                continue;
            }

            let Some(definitions) = source.list_definitions(&root, &self.catalog)? else {
                debug!(root = %root, "Root declares no migrations");
                continue;
            };

            let mut seen = HashSet::new();
            for definition in &definitions {
                if !seen.insert(definition.id()) || self.get(definition.id()).is_some() {
                    return Err(MigrationError::configuration(format!(
                        "migration {} is registered twice (again by root {root})",
                        definition.id()
                    )));
                }
            }

            debug!(root = %root, count = definitions.len(), "Loaded migrations");
            added += definitions.len();
            self.definitions.extend(definitions);
            self.loaded_roots.insert(root);
        }

        Ok(added)
    }

    /// Add a single definition.
    pub fn register(&mut self, definition: MigrationDefinition) -> Result<(), MigrationError> {
        if self.get(definition.id()).is_some() {
            return Err(MigrationError::configuration(format!(
                "migration {} is registered twice",
                definition.id()
            )));
        }
        self.definitions.push(definition);
        Ok(())
    }

    /// Every registered definition in discovery order, abstract ones included.
    pub fn definitions(&self) -> &[MigrationDefinition] {
        &self.definitions
    }

    /// Find a definition by id.
    pub fn get(&self, id: &str) -> Option<&MigrationDefinition> {
        self.definitions.iter().find(|d| d.id() == id)
    }

    /// Number of registered definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Forget every definition and loaded root.
    pub fn reset(&mut self) {
        self.definitions.clear();
        self.loaded_roots.clear();
    }

    /// Order the registered definitions for execution.
    pub fn plan(&self) -> Result<ExecutionPlan, MigrationError> {
        ExecutionPlan::build(&self.definitions)
    }
}
