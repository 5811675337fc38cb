//! Catalog of registered target entity types.

use super::EntityDef;
use std::collections::BTreeMap;

/// Registry of target entity types, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: BTreeMap<String, EntityDef>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type, replacing any previous definition with the same name.
    pub fn register(&mut self, entity: EntityDef) -> &mut Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Builder-style registration.
    pub fn with_entity(mut self, entity: EntityDef) -> Self {
        self.register(entity);
        self
    }

    /// Get an entity definition by name.
    pub fn get_entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.get(name)
    }

    /// Check if an entity type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// List registered entity names in sorted order.
    pub fn list_entities(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }

    /// Number of registered entity types.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl FromIterator<EntityDef> for Catalog {
    fn from_iter<I: IntoIterator<Item = EntityDef>>(iter: I) -> Self {
        let mut catalog = Catalog::new();
        for entity in iter {
            catalog.register(entity);
        }
        catalog
    }
}
