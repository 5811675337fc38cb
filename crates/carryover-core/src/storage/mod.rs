//! Target record storage.
//!
//! The migration engine talks to the target schema only through the
//! [`RecordStore`] trait. [`StorageEngine`] is the bundled sled implementation;
//! [`QueryLog`] decorates any store with per-operation tracing.

mod config;
mod engine;
mod index;
mod logging;
mod record;
mod transaction;

pub mod key;

pub use config::StorageConfig;
pub use engine::StorageEngine;
pub use logging::QueryLog;
pub use record::{values_match, Fields, Record};

use crate::error::Error;
use crate::migration::AppliedMigrationRecord;
use serde_json::Value;

/// Target record store consumed by the migration engine.
///
/// Lookups take a list of `(attribute, value)` criteria that must all match.
/// Values match when their textual forms are equal, so a legacy `"42"` finds a
/// record whose attribute holds the number `42`.
///
/// While a transaction is active every write is staged and reads see staged
/// writes. Without an active transaction writes are applied immediately.
pub trait RecordStore {
    /// Open the transaction scope. Nested transactions are not supported.
    fn begin(&self) -> Result<(), Error>;

    /// Apply every staged write atomically.
    fn commit(&self) -> Result<(), Error>;

    /// Discard every staged write.
    fn rollback(&self) -> Result<(), Error>;

    /// Whether a transaction is currently active.
    fn in_transaction(&self) -> bool;

    /// Find a previously migrated record of `entity` by its identity criteria.
    fn find_existing(&self, entity: &str, criteria: &[(&str, Value)])
        -> Result<Option<Record>, Error>;

    /// Resolve a related record for a relation attribute.
    fn resolve_related(
        &self,
        entity: &str,
        criteria: &[(&str, Value)],
    ) -> Result<Option<Record>, Error> {
        self.find_existing(entity, criteria)
    }

    /// Create a new record.
    fn create(&self, entity: &str, fields: Fields) -> Result<Record, Error>;

    /// Replace the fields of an existing record.
    fn update(&self, record: &Record, fields: Fields) -> Result<Record, Error>;

    /// Get a record by its store-assigned id.
    fn get(&self, entity: &str, id: u64) -> Result<Option<Record>, Error>;

    /// Delete a record. Returns whether it existed.
    fn delete(&self, entity: &str, id: u64) -> Result<bool, Error>;

    /// All records of an entity type in id order.
    fn all(&self, entity: &str) -> Result<Vec<Record>, Error>;

    /// Number of records of an entity type.
    fn count(&self, entity: &str) -> Result<usize, Error> {
        Ok(self.all(entity)?.len())
    }

    /// Persist the applied marker for a migration definition.
    ///
    /// Recording an already applied definition keeps the original marker.
    fn record_applied(&self, applied: &AppliedMigrationRecord) -> Result<(), Error>;

    /// Whether a migration definition has been applied before.
    fn is_applied(&self, class_identifier: &str) -> Result<bool, Error>;

    /// All applied markers, sorted by class identifier.
    fn applied_migrations(&self) -> Result<Vec<AppliedMigrationRecord>, Error>;
}
