//! Lifecycle hooks for migration definitions.

use super::error::MigrationError;
use crate::source::Row;
use crate::storage::{Fields, Record, RecordStore};

/// A transformed row that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    /// Target entity type.
    pub entity: String,
    /// Attribute values to persist.
    pub fields: Fields,
}

impl Draft {
    /// Create an empty draft for an entity type.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: Fields::new(),
        }
    }

    /// Set an attribute.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(field.into(), value.into());
    }
}

/// What to do with a row that failed with a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowRecovery {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Count the row as skipped and continue.
    Skip,
}

/// Per-definition lifecycle hooks. Every hook defaults to a no-op.
///
/// Call order for one definition:
///
/// ```text
/// before_all
///   for each row:
///     before_transformation -> (transform) -> before_save
///       -> update_existing (existing record) | create
///       -> after_save
/// after_all
/// ```
pub trait MigrationHooks: Send + Sync {
    /// Called once before the first row.
    fn before_all(&self, _store: &dyn RecordStore) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Called with the raw legacy row; may rewrite it.
    fn before_transformation(&self, _row: &mut Row) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Called with the transformed draft before it is persisted.
    fn before_save(&self, _draft: &mut Draft, _row: &Row) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Merge a draft into the record found by the identity lookup.
    ///
    /// Returns the fields to persist. The default overlays the draft on the
    /// existing fields.
    fn update_existing(&self, draft: Draft, existing: &Record) -> Result<Fields, MigrationError> {
        let mut fields = existing.fields.clone();
        fields.extend(draft.fields);
        Ok(fields)
    }

    /// Called with the persisted record.
    ///
    /// On error the save is reverted before the error is handed to
    /// [`recover_row_error`](Self::recover_row_error). Writes the hook made
    /// through `store` itself are not reverted.
    fn after_save(
        &self,
        _record: &Record,
        _row: &Row,
        _store: &dyn RecordStore,
    ) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Called once after the last row, skipped rows included.
    fn after_all(&self, _store: &dyn RecordStore) -> Result<(), MigrationError> {
        Ok(())
    }

    /// Decide whether a failed row may be skipped.
    ///
    /// Never consulted for missing relations, which always fail the run.
    fn recover_row_error(&self, _row: &Row, _error: &MigrationError) -> RowRecovery {
        RowRecovery::Abort
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl MigrationHooks for NoopHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_update_existing_overlays_draft() {
        let mut existing_fields = Fields::new();
        existing_fields.insert("id".into(), json!(1));
        existing_fields.insert("username".into(), json!("custom"));
        existing_fields.insert("email".into(), json!("old@example.org"));
        let existing = Record::new("Author", 1, existing_fields);

        let mut draft = Draft::new("Author");
        draft.set("id", 1);
        draft.set("email", "new@example.org");

        let merged = NoopHooks.update_existing(draft, &existing).unwrap();
        assert_eq!(merged["email"], json!("new@example.org"));
        assert_eq!(merged["username"], json!("custom"));
    }

    #[test]
    fn test_default_recovery_aborts() {
        let err = MigrationError::transformation("bad value");
        assert_eq!(NoopHooks.recover_row_error(&Row::new(), &err), RowRecovery::Abort);
    }
}
