//! Migration definitions.

use std::fmt;
use std::sync::Arc;

use super::attribute::AttributeSpec;
use super::hooks::{MigrationHooks, NoopHooks};

/// How one legacy query maps onto one target entity type.
///
/// Definitions are built once at load time and never change during a run.
#[derive(Clone)]
pub struct MigrationDefinition {
    id: String,
    target: String,
    query: String,
    columns: Vec<(String, AttributeSpec)>,
    depends_on: Vec<String>,
    identity: Option<String>,
    is_abstract: bool,
    hooks: Arc<dyn MigrationHooks>,
}

impl MigrationDefinition {
    /// Create a definition with a stable id and a target entity type.
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            query: String::new(),
            columns: Vec::new(),
            depends_on: Vec::new(),
            identity: None,
            is_abstract: false,
            hooks: Arc::new(NoopHooks),
        }
    }

    /// Set the legacy query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Attach an attribute spec to a legacy column.
    ///
    /// A column given twice keeps its first position and takes the new spec.
    pub fn with_column(mut self, column: impl Into<String>, spec: AttributeSpec) -> Self {
        let column = column.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = spec,
            None => self.columns.push((column, spec)),
        }
        self
    }

    /// Declare an explicit dependency on another entity type.
    pub fn depends_on(mut self, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        if !self.depends_on.contains(&entity) {
            self.depends_on.push(entity);
        }
        self
    }

    /// Enable update-existing detection through a target attribute.
    pub fn with_identity(mut self, attr: impl Into<String>) -> Self {
        self.identity = Some(attr.into());
        self
    }

    /// Mark as abstract: a base that is never executed.
    pub fn into_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Set the lifecycle hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn MigrationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Target entity type.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Legacy query.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Column specs in declaration order.
    pub fn columns(&self) -> &[(String, AttributeSpec)] {
        &self.columns
    }

    /// Spec for a legacy column.
    pub fn column(&self, name: &str) -> Option<&AttributeSpec> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, spec)| spec)
    }

    /// Identity attribute used to detect existing records.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Whether the definition is an abstract base.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Lifecycle hooks.
    pub fn hooks(&self) -> &dyn MigrationHooks {
        self.hooks.as_ref()
    }

    /// Entity types this definition depends on.
    ///
    /// Explicit dependencies first, then relation targets in column order,
    /// without duplicates.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        let relation_targets = self.columns.iter().filter_map(|(_, spec)| spec.dependency());
        for entity in self.depends_on.iter().map(String::as_str).chain(relation_targets) {
            if !deps.contains(&entity) {
                deps.push(entity);
            }
        }
        deps
    }
}

impl fmt::Debug for MigrationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationDefinition")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("columns", &self.columns)
            .field("depends_on", &self.depends_on)
            .field("identity", &self.identity)
            .field("is_abstract", &self.is_abstract)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, EntityDef};

    fn catalog() -> Catalog {
        ["Author", "Post", "Comment"]
            .into_iter()
            .map(EntityDef::new)
            .collect()
    }

    #[test]
    fn test_dependencies_merge_explicit_and_relations() {
        let catalog = catalog();
        let post = MigrationDefinition::new("blog.PostMigration", "Post")
            .depends_on("Author")
            .with_column(
                "author",
                AttributeSpec::is_a("Author", "id").foreign_key().resolve(&catalog).unwrap(),
            )
            .with_column(
                "comments",
                AttributeSpec::is_a("Comment", "id")
                    .many_to_many()
                    .resolve(&catalog)
                    .unwrap(),
            )
            .with_column("title", AttributeSpec::is_a("Post", "title").resolve(&catalog).unwrap());

        assert_eq!(post.dependencies(), vec!["Author", "Comment"]);
    }

    #[test]
    fn test_with_column_replaces_in_place() {
        let catalog = catalog();
        let def = MigrationDefinition::new("blog.AuthorMigration", "Author")
            .with_column("a", AttributeSpec::excluded().resolve(&catalog).unwrap())
            .with_column("b", AttributeSpec::excluded().resolve(&catalog).unwrap())
            .with_column("a", AttributeSpec::is_a("Author", "x").resolve(&catalog).unwrap());

        let names: Vec<_> = def.columns().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(!def.column("a").unwrap().is_excluded());
    }

    #[test]
    fn test_abstract_flag() {
        let base = MigrationDefinition::new("blog.BaseMigration", "Author").into_abstract();
        assert!(base.is_abstract());
        assert!(!MigrationDefinition::new("x", "Author").is_abstract());
    }
}
