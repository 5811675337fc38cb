//! Migration executor - runs one definition row by row.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::applied::AppliedMigrationRecord;
use super::attribute::{AttributeSpec, RelationKind};
use super::definition::MigrationDefinition;
use super::error::MigrationError;
use super::hooks::{Draft, RowRecovery};
use crate::catalog::Catalog;
use crate::source::{LegacySource, Row};
use crate::storage::{Record, RecordStore};

/// Receives one callback per migrated element.
pub trait ProgressObserver {
    /// Called after a row has been persisted. `index` counts from 1.
    fn element_migrated(&self, migration: &str, index: usize, record: &Record, created: bool);
}

/// A row that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Row identity or position.
    pub row: String,
    /// Error message.
    pub message: String,
}

/// Result of executing one definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Definition id.
    pub migration: String,
    /// Records created.
    pub created: usize,
    /// Existing records updated.
    pub updated: usize,
    /// Rows skipped after a recovered error.
    pub skipped: usize,
    /// Errors of the skipped rows.
    pub errors: Vec<RowError>,
    /// Whether the definition had been applied by an earlier run.
    pub rerun: bool,
}

impl ExecutionResult {
    fn new(migration: &str) -> Self {
        Self {
            migration: migration.to_string(),
            ..Self::default()
        }
    }

    /// Rows persisted, created or updated.
    pub fn migrated(&self) -> usize {
        self.created + self.updated
    }
}

/// Runs migration definitions against a store.
pub struct MigrationExecutor<'a> {
    store: &'a dyn RecordStore,
    source: &'a dyn LegacySource,
    catalog: &'a Catalog,
    progress: Option<&'a dyn ProgressObserver>,
}

impl<'a> MigrationExecutor<'a> {
    /// Create an executor.
    pub fn new(
        store: &'a dyn RecordStore,
        source: &'a dyn LegacySource,
        catalog: &'a Catalog,
    ) -> Self {
        Self {
            store,
            source,
            catalog,
            progress: None,
        }
    }

    /// Report every migrated element to `observer`.
    pub fn with_progress(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Execute one definition.
    ///
    /// Writes go straight to the store; callers wanting all-or-nothing
    /// behaviour run this inside a store transaction.
    pub fn execute(
        &self,
        definition: &MigrationDefinition,
    ) -> Result<ExecutionResult, MigrationError> {
        if definition.is_abstract() {
            return Err(MigrationError::AbstractDefinition {
                migration: definition.id().to_string(),
            });
        }

        let mut result = ExecutionResult::new(definition.id());
        result.rerun = self.store.is_applied(definition.id())?;
        info!(
            migration = definition.id(),
            target = definition.target(),
            rerun = result.rerun,
            "Running migration"
        );

        let hooks = definition.hooks();
        hooks.before_all(self.store)?;

        let rows = self.source.fetch(definition.query())?;
        let label_column = definition.identity().unwrap_or("id");

        for (position, mut row) in rows.into_iter().enumerate() {
            match self.migrate_row(definition, &mut row) {
                Ok((record, created)) => {
                    if created {
                        result.created += 1;
                    } else {
                        result.updated += 1;
                    }
                    debug!(
                        migration = definition.id(),
                        id = record.id,
                        created,
                        "Migrated row"
                    );
                    if let Some(observer) = self.progress {
                        observer.element_migrated(
                            definition.id(),
                            result.migrated(),
                            &record,
                            created,
                        );
                    }
                }
                Err(err) => {
                    let label = row.label(label_column, position);
                    let recoverable = !err.is_missing_relation()
                        && hooks.recover_row_error(&row, &err) == RowRecovery::Skip;
                    if !recoverable {
                        return Err(MigrationError::Row {
                            migration: definition.id().to_string(),
                            row: label,
                            source: Box::new(err),
                        });
                    }
                    warn!(
                        migration = definition.id(),
                        row = %label,
                        error = %err,
                        "Skipping row"
                    );
                    result.skipped += 1;
                    result.errors.push(RowError {
                        row: label,
                        message: err.to_string(),
                    });
                }
            }
        }

        hooks.after_all(self.store)?;
        self.store
            .record_applied(&AppliedMigrationRecord::new(definition.id()))?;

        info!(
            migration = definition.id(),
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            "Migration finished"
        );
        Ok(result)
    }

    /// Transform and persist one row. Returns the record and whether it was created.
    fn migrate_row(
        &self,
        definition: &MigrationDefinition,
        row: &mut Row,
    ) -> Result<(Record, bool), MigrationError> {
        let hooks = definition.hooks();
        hooks.before_transformation(row)?;

        let mut draft = self.transform(definition, row)?;
        hooks.before_save(&mut draft, row)?;
        self.check_fields(&draft)?;

        let existing = match definition.identity() {
            Some(identity) => match draft.fields.get(identity) {
                Some(value) if !value.is_null() => self
                    .store
                    .find_existing(&draft.entity, &[(identity, value.clone())])?,
                _ => None,
            },
            None => None,
        };

        self.check_one_to_one(definition, &draft, existing.as_ref())?;

        let (record, created) = match &existing {
            Some(existing) => {
                let fields = hooks.update_existing(draft, existing)?;
                (self.store.update(existing, fields)?, false)
            }
            None => (self.store.create(&draft.entity, draft.fields)?, true),
        };

        if let Err(err) = hooks.after_save(&record, row, self.store) {
            self.undo_save(&record, existing)?;
            return Err(err);
        }
        Ok((record, created))
    }

    /// Revert the write of a row whose `after_save` failed, so a skipped row
    /// leaves no record behind.
    fn undo_save(&self, record: &Record, previous: Option<Record>) -> Result<(), MigrationError> {
        match previous {
            Some(previous) => {
                self.store.update(record, previous.fields)?;
            }
            None => {
                self.store.delete(&record.entity, record.id)?;
            }
        }
        Ok(())
    }

    /// Apply the column specs to a legacy row.
    fn transform(&self, definition: &MigrationDefinition, row: &Row) -> Result<Draft, MigrationError> {
        let mut draft = Draft::new(definition.target());

        for (column, value) in row.iter() {
            let Some(spec) = definition.column(column) else {
                draft.set(column, value.clone());
                continue;
            };
            if spec.is_excluded() {
                continue;
            }

            match spec.relation() {
                RelationKind::None => {
                    let attr = spec.attr().unwrap_or(column);
                    draft.set(attr, value.clone());
                }
                RelationKind::ForeignKey | RelationKind::OneToOne => {
                    let related = match text_of(value) {
                        Some(text) => self.resolve(column, spec, &text)?,
                        None => None,
                    };
                    draft.set(column, related.map_or(Value::Null, Value::from));
                }
                RelationKind::ManyToMany => {
                    let mut ids = Vec::new();
                    if let Some(text) = text_of(value) {
                        for token in text.split(spec.delimiter()).map(str::trim) {
                            if token.is_empty() {
                                continue;
                            }
                            if let Some(id) = self.resolve_token(column, spec, token)? {
                                ids.push(id);
                            }
                        }
                    }
                    ids.sort_unstable();
                    ids.dedup();
                    draft.set(column, ids);
                }
            }
        }

        Ok(draft)
    }

    /// Resolve a foreign key or one-to-one value, composite keys included.
    fn resolve(
        &self,
        column: &str,
        spec: &AttributeSpec,
        text: &str,
    ) -> Result<Option<u64>, MigrationError> {
        let attrs = spec.lookup_attrs();
        let values: Vec<&str> = if attrs.len() > 1 {
            text.split(spec.delimiter()).map(str::trim).collect()
        } else {
            vec![text]
        };

        if attrs.len() != values.len() {
            return Err(MigrationError::transformation(format!(
                "column `{column}` holds {} values for {} key attributes",
                values.len(),
                attrs.len()
            )));
        }

        let criteria: Vec<(&str, Value)> = attrs
            .into_iter()
            .zip(values)
            .map(|(attr, value)| (attr, Value::from(value)))
            .collect();
        self.lookup(column, spec, &criteria)
    }

    /// Resolve one many-to-many token.
    fn resolve_token(
        &self,
        column: &str,
        spec: &AttributeSpec,
        token: &str,
    ) -> Result<Option<u64>, MigrationError> {
        let attr = spec.attr().unwrap_or(column);
        self.lookup(column, spec, &[(attr, Value::from(token))])
    }

    fn lookup(
        &self,
        column: &str,
        spec: &AttributeSpec,
        criteria: &[(&str, Value)],
    ) -> Result<Option<u64>, MigrationError> {
        let target = spec.target().unwrap_or_default();
        if let Some(record) = self.store.resolve_related(target, criteria)? {
            return Ok(Some(record.id));
        }

        let key = criteria
            .iter()
            .map(|(attr, value)| match value {
                Value::String(s) => format!("{attr}={s}"),
                other => format!("{attr}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", ");

        if spec.skip_missing() {
            debug!(column, target, key = %key, "Related record missing, leaving unset");
            return Ok(None);
        }
        Err(MigrationError::MissingRelation {
            attribute: column.to_string(),
            target: target.to_string(),
            key,
        })
    }

    /// Reject attributes the target entity does not declare.
    fn check_fields(&self, draft: &Draft) -> Result<(), MigrationError> {
        let Some(entity) = self.catalog.get_entity(&draft.entity) else {
            return Ok(());
        };
        let undeclared: Vec<&str> = draft
            .fields
            .keys()
            .map(String::as_str)
            .filter(|field| !entity.accepts(field))
            .collect();
        if undeclared.is_empty() {
            return Ok(());
        }
        Err(MigrationError::transformation(format!(
            "{} has no attribute {}",
            draft.entity,
            undeclared.join(", ")
        )))
    }

    /// A one-to-one relation may bind each related record only once.
    fn check_one_to_one(
        &self,
        definition: &MigrationDefinition,
        draft: &Draft,
        existing: Option<&Record>,
    ) -> Result<(), MigrationError> {
        for (column, spec) in definition.columns() {
            if spec.relation() != RelationKind::OneToOne {
                continue;
            }
            let Some(value) = draft.fields.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let bound = self
                .store
                .find_existing(&draft.entity, &[(column.as_str(), value.clone())])?;
            if let Some(bound) = bound {
                if existing.map(|e| e.id) != Some(bound.id) {
                    return Err(MigrationError::transformation(format!(
                        "one-to-one attribute `{column}` already binds {} #{value} to {} #{}",
                        spec.target().unwrap_or_default(),
                        draft.entity,
                        bound.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Text of a relation value. Null and blank values carry no relation.
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
