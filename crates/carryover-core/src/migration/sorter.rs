//! Dependency ordering of migration definitions.

use std::collections::HashMap;

use super::definition::MigrationDefinition;
use super::error::MigrationError;

/// DFS marker for one definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Orders definitions so every relation target is migrated before the
/// definitions that reference it.
pub struct DependencySorter;

impl DependencySorter {
    /// Sort definitions by dependency.
    ///
    /// Abstract definitions are dropped. Dependencies on entity types that no
    /// input definition targets are assumed satisfied. A definition related to
    /// its own target type does not depend on itself. Independent definitions
    /// keep their input order.
    pub fn sort(
        definitions: &[MigrationDefinition],
    ) -> Result<Vec<MigrationDefinition>, MigrationError> {
        let concrete: Vec<&MigrationDefinition> =
            definitions.iter().filter(|d| !d.is_abstract()).collect();

        let mut by_target: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, definition) in concrete.iter().enumerate() {
            by_target
                .entry(definition.target())
                .or_default()
                .push(index);
        }

        let edges: Vec<Vec<usize>> = concrete
            .iter()
            .enumerate()
            .map(|(index, definition)| {
                let mut out = Vec::new();
                for entity in definition.dependencies() {
                    if entity == definition.target() {
                        continue;
                    }
                    for &dep in by_target.get(entity).into_iter().flatten() {
                        if dep != index && !out.contains(&dep) {
                            out.push(dep);
                        }
                    }
                }
                out
            })
            .collect();

        let mut marks = vec![Mark::Unvisited; concrete.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(concrete.len());
        for index in 0..concrete.len() {
            Self::visit(index, &concrete, &edges, &mut marks, &mut path, &mut order)?;
        }

        Ok(order.into_iter().map(|i| concrete[i].clone()).collect())
    }

    fn visit(
        index: usize,
        definitions: &[&MigrationDefinition],
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), MigrationError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let start = path.iter().position(|&i| i == index).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&i| definitions[i].id().to_string())
                    .collect();
                cycle.push(definitions[index].id().to_string());
                return Err(MigrationError::DependencyCycle { cycle });
            }
            Mark::Unvisited => {}
        }

        marks[index] = Mark::Visiting;
        path.push(index);
        for &dep in &edges[index] {
            Self::visit(dep, definitions, edges, marks, path, order)?;
        }
        path.pop();
        marks[index] = Mark::Done;
        order.push(index);
        Ok(())
    }
}

/// The ordered, abstract-free definitions for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    definitions: Vec<MigrationDefinition>,
}

impl ExecutionPlan {
    /// Build a plan from definitions in discovery order.
    pub fn build(definitions: &[MigrationDefinition]) -> Result<Self, MigrationError> {
        Ok(Self {
            definitions: DependencySorter::sort(definitions)?,
        })
    }

    /// Definitions in execution order.
    pub fn definitions(&self) -> &[MigrationDefinition] {
        &self.definitions
    }

    /// Iterate definitions in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &MigrationDefinition> {
        self.definitions.iter()
    }

    /// Definition ids in execution order.
    pub fn ids(&self) -> Vec<&str> {
        self.definitions.iter().map(MigrationDefinition::id).collect()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the plan is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str, target: &str, deps: &[&str]) -> MigrationDefinition {
        deps.iter()
            .fold(MigrationDefinition::new(id, target), |d, dep| d.depends_on(*dep))
    }

    fn targets(sorted: &[MigrationDefinition]) -> Vec<&str> {
        sorted.iter().map(MigrationDefinition::target).collect()
    }

    #[test]
    fn test_topological_sorting() {
        let author = def("blog.AuthorMigration", "Author", &[]);
        let post = def("blog.PostMigration", "Post", &["Author", "Comment"]);
        let comment = def("blog.CommentMigration", "Comment", &["Author"]);

        let sorted = DependencySorter::sort(&[author, post, comment]).unwrap();
        assert_eq!(targets(&sorted), vec!["Author", "Comment", "Post"]);
    }

    #[test]
    fn test_dependents_listed_first_still_sort() {
        let post = def("blog.PostMigration", "Post", &["Author", "Comment"]);
        let comment = def("blog.CommentMigration", "Comment", &["Author"]);
        let author = def("blog.AuthorMigration", "Author", &[]);

        let sorted = DependencySorter::sort(&[post, comment, author]).unwrap();
        assert_eq!(targets(&sorted), vec!["Author", "Comment", "Post"]);
    }

    #[test]
    fn test_independent_definitions_keep_discovery_order() {
        let a = def("x.Tag", "Tag", &[]);
        let b = def("x.Country", "Country", &[]);
        let c = def("x.Currency", "Currency", &[]);

        let sorted = DependencySorter::sort(&[a, b, c]).unwrap();
        assert_eq!(targets(&sorted), vec!["Tag", "Country", "Currency"]);
    }

    #[test]
    fn test_that_no_abstract_migration_will_be_sorted_in() {
        let base = def("blog.BaseMigration", "Author", &[]).into_abstract();
        let author = def("blog.AuthorMigration", "Author", &[]);
        let post = def("blog.PostMigration", "Post", &["Author"]);

        for input in [
            vec![base.clone(), author.clone(), post.clone()],
            vec![post.clone(), author.clone(), base.clone()],
        ] {
            let sorted = DependencySorter::sort(&input).unwrap();
            assert!(sorted.iter().all(|d| d.id() != "blog.BaseMigration"));
            assert_eq!(sorted.len(), 2);
        }
    }

    #[test]
    fn test_missing_dependency_is_ignored() {
        let post = def("blog.PostMigration", "Post", &["User"]);
        let sorted = DependencySorter::sort(&[post]).unwrap();
        assert_eq!(targets(&sorted), vec!["Post"]);
    }

    #[test]
    fn test_self_dependency_is_ignored() {
        let comment = def("blog.CommentMigration", "Comment", &["Comment"]);
        assert!(DependencySorter::sort(&[comment]).is_ok());
    }

    #[test]
    fn test_cycle_is_detected() {
        let a = def("x.A", "A", &["B"]);
        let b = def("x.B", "B", &["C"]);
        let c = def("x.C", "C", &["A"]);

        match DependencySorter::sort(&[a, b, c]) {
            Err(MigrationError::DependencyCycle { cycle }) => {
                assert_eq!(cycle, vec!["x.A", "x.B", "x.C", "x.A"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_ids() {
        let plan = ExecutionPlan::build(&[
            def("blog.PostMigration", "Post", &["Author"]),
            def("blog.AuthorMigration", "Author", &[]),
        ])
        .unwrap();
        assert_eq!(plan.ids(), vec!["blog.AuthorMigration", "blog.PostMigration"]);
        assert_eq!(plan.len(), 2);
    }
}
