//! Query logging decorator for record stores.

use super::{Fields, Record, RecordStore};
use crate::error::Error;
use crate::migration::AppliedMigrationRecord;
use serde_json::Value;

/// Tracing target for persistence operations.
pub const QUERY_TARGET: &str = "carryover::query";

/// Wraps a store and traces every persistence operation.
///
/// Used for `--logquery` runs. Outcomes are passed through untouched.
pub struct QueryLog<'a> {
    inner: &'a dyn RecordStore,
}

impl<'a> QueryLog<'a> {
    /// Wrap a store.
    pub fn new(inner: &'a dyn RecordStore) -> Self {
        Self { inner }
    }
}

fn describe(criteria: &[(&str, Value)]) -> String {
    criteria
        .iter()
        .map(|(field, value)| format!("{field}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl RecordStore for QueryLog<'_> {
    fn begin(&self) -> Result<(), Error> {
        tracing::info!(target: QUERY_TARGET, "BEGIN");
        self.inner.begin()
    }

    fn commit(&self) -> Result<(), Error> {
        tracing::info!(target: QUERY_TARGET, "COMMIT");
        self.inner.commit()
    }

    fn rollback(&self) -> Result<(), Error> {
        tracing::info!(target: QUERY_TARGET, "ROLLBACK");
        self.inner.rollback()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn find_existing(
        &self,
        entity: &str,
        criteria: &[(&str, Value)],
    ) -> Result<Option<Record>, Error> {
        let found = self.inner.find_existing(entity, criteria)?;
        tracing::info!(
            target: QUERY_TARGET,
            entity,
            criteria = %describe(criteria),
            found = found.is_some(),
            "find existing"
        );
        Ok(found)
    }

    fn resolve_related(
        &self,
        entity: &str,
        criteria: &[(&str, Value)],
    ) -> Result<Option<Record>, Error> {
        let found = self.inner.resolve_related(entity, criteria)?;
        tracing::info!(
            target: QUERY_TARGET,
            entity,
            criteria = %describe(criteria),
            found = found.as_ref().map(|r| r.id),
            "resolve related"
        );
        Ok(found)
    }

    fn create(&self, entity: &str, fields: Fields) -> Result<Record, Error> {
        let record = self.inner.create(entity, fields)?;
        tracing::info!(
            target: QUERY_TARGET,
            entity,
            id = record.id,
            fields = %serde_json::to_string(&record.fields).unwrap_or_default(),
            "insert"
        );
        Ok(record)
    }

    fn update(&self, record: &Record, fields: Fields) -> Result<Record, Error> {
        let updated = self.inner.update(record, fields)?;
        tracing::info!(
            target: QUERY_TARGET,
            entity = %updated.entity,
            id = updated.id,
            fields = %serde_json::to_string(&updated.fields).unwrap_or_default(),
            "update"
        );
        Ok(updated)
    }

    fn get(&self, entity: &str, id: u64) -> Result<Option<Record>, Error> {
        tracing::info!(target: QUERY_TARGET, entity, id, "get");
        self.inner.get(entity, id)
    }

    fn delete(&self, entity: &str, id: u64) -> Result<bool, Error> {
        tracing::info!(target: QUERY_TARGET, entity, id, "delete");
        self.inner.delete(entity, id)
    }

    fn all(&self, entity: &str) -> Result<Vec<Record>, Error> {
        tracing::info!(target: QUERY_TARGET, entity, "scan");
        self.inner.all(entity)
    }

    fn record_applied(&self, applied: &AppliedMigrationRecord) -> Result<(), Error> {
        tracing::info!(
            target: QUERY_TARGET,
            migration = %applied.class_identifier,
            "record applied migration"
        );
        self.inner.record_applied(applied)
    }

    fn is_applied(&self, class_identifier: &str) -> Result<bool, Error> {
        self.inner.is_applied(class_identifier)
    }

    fn applied_migrations(&self) -> Result<Vec<AppliedMigrationRecord>, Error> {
        self.inner.applied_migrations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use serde_json::json;

    #[test]
    fn test_passes_operations_through() {
        let store = StorageEngine::temporary().unwrap();
        let logged = QueryLog::new(&store);

        logged.begin().unwrap();
        let mut fields = Fields::new();
        fields.insert("id".to_string(), json!(3));
        let record = logged.create("Author", fields).unwrap();
        assert!(logged.in_transaction());
        assert_eq!(
            logged
                .resolve_related("Author", &[("id", json!("3"))])
                .unwrap()
                .map(|r| r.id),
            Some(record.id)
        );
        logged.commit().unwrap();

        assert_eq!(store.count("Author").unwrap(), 1);
    }

    #[test]
    fn test_describe_criteria() {
        assert_eq!(
            describe(&[("id", json!(1)), ("name", json!("x"))]),
            "id=1, name=\"x\""
        );
    }
}
