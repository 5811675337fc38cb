//! Storage engine implementation.

use std::collections::{BTreeMap, BTreeSet};

use super::index::{index_prefix, ValueIndex, INDEX_TREE};
use super::key::{entity_prefix, sequence_key, RecordKey};
use super::record::lookup_text;
use super::transaction::Transaction;
use super::{Fields, Record, RecordStore, StorageConfig};
use crate::error::Error;
use crate::migration::AppliedMigrationRecord;
use parking_lot::Mutex;
use serde_json::Value;
use sled::{Db, Tree};

/// Tree name for target records.
const RECORDS_TREE: &str = "records";

/// Tree name for applied migration markers.
const APPLIED_TREE: &str = "applied_migrations";

/// Tree name for metadata (id sequences).
const META_TREE: &str = "meta";

/// The target record store wrapping sled.
pub struct StorageEngine {
    /// The underlying sled database.
    db: Db,

    /// Tree for target records.
    records_tree: Tree,

    /// Tree for applied migration markers.
    applied_tree: Tree,

    /// Tree for metadata.
    meta_tree: Tree,

    /// Committed attribute value index.
    index: ValueIndex,

    /// The active transaction, if any.
    pending: Mutex<Option<Transaction>>,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let records_tree = db.open_tree(RECORDS_TREE)?;
        let applied_tree = db.open_tree(APPLIED_TREE)?;
        let meta_tree = db.open_tree(META_TREE)?;
        let index = ValueIndex::new(db.open_tree(INDEX_TREE)?);
        index.ensure_built(&records_tree, &meta_tree)?;

        Ok(Self {
            db,
            records_tree,
            applied_tree,
            meta_tree,
            index,
            pending: Mutex::new(None),
        })
    }

    /// Open a temporary store that is deleted on drop.
    pub fn temporary() -> Result<Self, Error> {
        Self::open(StorageConfig::temporary())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Run a write against the active transaction, or apply it immediately
    /// when no transaction is active.
    fn write<T>(&self, f: impl FnOnce(&mut Transaction) -> Result<T, Error>) -> Result<T, Error> {
        let mut pending = self.pending.lock();
        match pending.as_mut() {
            Some(tx) => f(tx),
            None => {
                let mut tx = Transaction::default();
                let out = f(&mut tx)?;
                self.apply(tx)?;
                Ok(out)
            }
        }
    }

    fn apply(&self, tx: Transaction) -> Result<(), Error> {
        tx.apply(
            &self.records_tree,
            &self.applied_tree,
            &self.meta_tree,
            self.index.tree(),
        )
    }

    /// Ids whose current record has `attr` equal to `text`, in id order.
    ///
    /// Committed hits shadowed by a staged write are dropped; the staged
    /// record, if it still carries the value, comes from the staged index.
    fn indexed_ids(&self, entity: &str, attr: &str, text: &str) -> Result<BTreeSet<u64>, Error> {
        let prefix = index_prefix(entity, attr, text);
        let mut ids = self.index.lookup(&prefix)?;
        if let Some(tx) = self.pending.lock().as_ref() {
            ids.retain(|id| tx.staged(entity, *id).is_none());
            ids.extend(tx.indexed(&prefix));
        }
        Ok(ids)
    }

    /// Last committed id of an entity type.
    fn committed_sequence(&self, entity: &str) -> Result<u64, Error> {
        match self.meta_tree.get(sequence_key(entity))? {
            Some(bytes) => {
                if bytes.len() != 8 {
                    return Err(Error::InvalidData(format!(
                        "corrupt id sequence for entity {entity}"
                    )));
                }
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(u64::from_be_bytes(buf))
            }
            None => Ok(0),
        }
    }

    fn committed_record(&self, entity: &str, id: u64) -> Result<Option<Record>, Error> {
        match self.records_tree.get(RecordKey::new(entity, id).encode())? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Committed records of an entity overlaid with staged writes.
    fn load_entity(&self, entity: &str) -> Result<Vec<Record>, Error> {
        let mut merged: BTreeMap<Vec<u8>, Record> = BTreeMap::new();
        for item in self.records_tree.scan_prefix(entity_prefix(entity)) {
            let (key, bytes) = item?;
            merged.insert(key.to_vec(), Record::from_bytes(&bytes)?);
        }

        if let Some(tx) = self.pending.lock().as_ref() {
            for (key, staged) in tx.staged_for_entity(entity) {
                match staged {
                    Some(record) => {
                        merged.insert(key.clone(), record.clone());
                    }
                    None => {
                        merged.remove(key);
                    }
                }
            }
        }

        Ok(merged.into_values().collect())
    }
}

impl RecordStore for StorageEngine {
    fn begin(&self) -> Result<(), Error> {
        let mut pending = self.pending.lock();
        if pending.is_some() {
            return Err(Error::Transaction(
                "a transaction is already active".to_string(),
            ));
        }
        *pending = Some(Transaction::default());
        tracing::debug!("transaction started");
        Ok(())
    }

    fn commit(&self) -> Result<(), Error> {
        let tx = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::Transaction("no active transaction to commit".to_string()))?;
        let ops = tx.op_count();
        self.apply(tx)?;
        self.flush()?;
        tracing::debug!(ops, "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<(), Error> {
        let tx = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| Error::Transaction("no active transaction to roll back".to_string()))?;
        tracing::debug!(discarded = tx.op_count(), "transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn find_existing(
        &self,
        entity: &str,
        criteria: &[(&str, Value)],
    ) -> Result<Option<Record>, Error> {
        let Some((attr, value)) = criteria.first() else {
            return Ok(None);
        };
        let Some(text) = lookup_text(value) else {
            return Ok(None);
        };

        for id in self.indexed_ids(entity, attr, &text)? {
            if let Some(record) = self.get(entity, id)? {
                if record.matches(criteria) {
                    return Ok(Some(record));
                }
            }
        }
        Ok(None)
    }

    fn create(&self, entity: &str, fields: Fields) -> Result<Record, Error> {
        let committed_last = self.committed_sequence(entity)?;
        self.write(|tx| {
            let id = tx.allocate_id(entity, committed_last);
            let record = Record::new(entity, id, fields);
            tx.put_record(record.clone());
            Ok(record)
        })
    }

    fn update(&self, record: &Record, fields: Fields) -> Result<Record, Error> {
        if self.get(&record.entity, record.id)?.is_none() {
            return Err(Error::NotFound {
                entity: record.entity.clone(),
                id: record.id,
            });
        }
        let updated = record.with_fields(fields);
        self.write(|tx| {
            tx.put_record(updated.clone());
            Ok(updated)
        })
    }

    fn get(&self, entity: &str, id: u64) -> Result<Option<Record>, Error> {
        if let Some(tx) = self.pending.lock().as_ref() {
            if let Some(staged) = tx.staged(entity, id) {
                return Ok(staged.cloned());
            }
        }
        self.committed_record(entity, id)
    }

    fn delete(&self, entity: &str, id: u64) -> Result<bool, Error> {
        if self.get(entity, id)?.is_none() {
            return Ok(false);
        }
        self.write(|tx| {
            tx.delete_record(entity, id);
            Ok(true)
        })
    }

    fn all(&self, entity: &str) -> Result<Vec<Record>, Error> {
        self.load_entity(entity)
    }

    fn record_applied(&self, applied: &AppliedMigrationRecord) -> Result<(), Error> {
        if self
            .applied_tree
            .contains_key(applied.class_identifier.as_bytes())?
        {
            return Ok(());
        }
        self.write(|tx| {
            tx.record_applied(applied);
            Ok(())
        })
    }

    fn is_applied(&self, class_identifier: &str) -> Result<bool, Error> {
        if let Some(tx) = self.pending.lock().as_ref() {
            if tx.has_applied(class_identifier) {
                return Ok(true);
            }
        }
        Ok(self.applied_tree.contains_key(class_identifier.as_bytes())?)
    }

    fn applied_migrations(&self) -> Result<Vec<AppliedMigrationRecord>, Error> {
        let mut markers: BTreeMap<String, AppliedMigrationRecord> = BTreeMap::new();
        for item in self.applied_tree.iter() {
            let (_, bytes) = item?;
            let marker = AppliedMigrationRecord::from_bytes(&bytes)?;
            markers.insert(marker.class_identifier.clone(), marker);
        }
        if let Some(tx) = self.pending.lock().as_ref() {
            for marker in tx.applied() {
                markers
                    .entry(marker.class_identifier.clone())
                    .or_insert_with(|| marker.clone());
            }
        }
        Ok(markers.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_autocommit_create_and_get() {
        let store = StorageEngine::temporary().unwrap();
        let record = store
            .create("Author", fields(&[("id", json!(1)), ("lastname", json!("Doe"))]))
            .unwrap();

        assert_eq!(record.id, 1);
        let loaded = store.get("Author", record.id).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.count("Author").unwrap(), 1);
    }

    #[test]
    fn test_ids_are_sequential_per_entity() {
        let store = StorageEngine::temporary().unwrap();
        let a1 = store.create("Author", Fields::new()).unwrap();
        let a2 = store.create("Author", Fields::new()).unwrap();
        let p1 = store.create("Post", Fields::new()).unwrap();

        assert_eq!((a1.id, a2.id, p1.id), (1, 2, 1));
    }

    #[test]
    fn test_rollback_discards_staged_writes() {
        let store = StorageEngine::temporary().unwrap();
        store.begin().unwrap();
        store.create("Author", fields(&[("id", json!(1))])).unwrap();
        store
            .record_applied(&AppliedMigrationRecord::new("blog.AuthorMigration"))
            .unwrap();

        // visible inside the transaction
        assert_eq!(store.count("Author").unwrap(), 1);
        assert!(store.is_applied("blog.AuthorMigration").unwrap());

        store.rollback().unwrap();
        assert_eq!(store.count("Author").unwrap(), 0);
        assert!(store.applied_migrations().unwrap().is_empty());
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_commit_applies_staged_writes() {
        let store = StorageEngine::temporary().unwrap();
        store.begin().unwrap();
        let author = store.create("Author", fields(&[("id", json!(1))])).unwrap();
        store
            .update(&author, fields(&[("id", json!(1)), ("username", json!("ada"))]))
            .unwrap();
        store
            .record_applied(&AppliedMigrationRecord::new("blog.AuthorMigration"))
            .unwrap();
        store.commit().unwrap();

        let loaded = store.get("Author", author.id).unwrap().unwrap();
        assert_eq!(loaded.get("username"), Some(&json!("ada")));
        assert_eq!(store.applied_migrations().unwrap().len(), 1);
    }

    #[test]
    fn test_sequence_survives_rollback_boundary() {
        let store = StorageEngine::temporary().unwrap();
        store.create("Author", Fields::new()).unwrap();

        store.begin().unwrap();
        let staged = store.create("Author", Fields::new()).unwrap();
        store.rollback().unwrap();

        let next = store.create("Author", Fields::new()).unwrap();
        assert_eq!(staged.id, 2);
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_nested_begin_is_rejected() {
        let store = StorageEngine::temporary().unwrap();
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(Error::Transaction(_))));
        store.rollback().unwrap();
        assert!(matches!(store.commit(), Err(Error::Transaction(_))));
    }

    #[test]
    fn test_find_existing_sees_staged_and_deleted() {
        let store = StorageEngine::temporary().unwrap();
        let committed = store.create("Author", fields(&[("id", json!(10))])).unwrap();

        store.begin().unwrap();
        store.create("Author", fields(&[("id", json!(11))])).unwrap();
        store.delete("Author", committed.id).unwrap();

        assert!(store
            .find_existing("Author", &[("id", json!("11"))])
            .unwrap()
            .is_some());
        assert!(store
            .find_existing("Author", &[("id", json!(10))])
            .unwrap()
            .is_none());
        store.rollback().unwrap();

        assert!(store
            .find_existing("Author", &[("id", json!(10))])
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_lookup_follows_updates_across_commit() {
        let store = StorageEngine::temporary().unwrap();
        let ada = store.create("Author", fields(&[("email", json!("ada@example.org"))])).unwrap();

        store.begin().unwrap();
        store
            .update(&ada, fields(&[("email", json!("ada@lovelace.org"))]))
            .unwrap();
        assert!(store
            .find_existing("Author", &[("email", json!("ada@example.org"))])
            .unwrap()
            .is_none());
        assert_eq!(
            store
                .find_existing("Author", &[("email", json!(" ada@lovelace.org "))])
                .unwrap()
                .map(|r| r.id),
            Some(ada.id)
        );
        store.commit().unwrap();

        assert!(store
            .find_existing("Author", &[("email", json!("ada@example.org"))])
            .unwrap()
            .is_none());
        assert!(store
            .find_existing("Author", &[("email", json!("ada@lovelace.org"))])
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_lookup_returns_lowest_matching_id() {
        let store = StorageEngine::temporary().unwrap();
        store.create("Post", fields(&[("author", json!(1)), ("title", json!("a"))])).unwrap();
        store.begin().unwrap();
        store.create("Post", fields(&[("author", json!(1)), ("title", json!("b"))])).unwrap();
        store.create("Post", fields(&[("author", json!(2)), ("title", json!("b"))])).unwrap();

        let first = store.find_existing("Post", &[("author", json!("1"))]).unwrap().unwrap();
        assert_eq!(first.id, 1);

        let both = store
            .find_existing("Post", &[("author", json!(1)), ("title", json!("b"))])
            .unwrap()
            .unwrap();
        assert_eq!(both.id, 2);

        assert!(store.find_existing("Post", &[("author", Value::Null)]).unwrap().is_none());
        assert!(store.find_existing("Post", &[]).unwrap().is_none());
        store.rollback().unwrap();
    }

    #[test]
    fn test_deleted_record_leaves_index() {
        let store = StorageEngine::temporary().unwrap();
        let author = store.create("Author", fields(&[("id", json!(5))])).unwrap();
        assert!(store.delete("Author", author.id).unwrap());

        assert!(store.find_existing("Author", &[("id", json!(5))]).unwrap().is_none());
        assert!(store.index.lookup(&index_prefix("Author", "id", "5")).unwrap().is_empty());
    }

    #[test]
    fn test_update_missing_record_fails() {
        let store = StorageEngine::temporary().unwrap();
        let ghost = Record::new("Author", 99, Fields::new());
        assert!(matches!(
            store.update(&ghost, Fields::new()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_record_applied_is_idempotent() {
        let store = StorageEngine::temporary().unwrap();
        let first = AppliedMigrationRecord::with_timestamp("blog.AuthorMigration", 1);
        store.record_applied(&first).unwrap();
        store
            .record_applied(&AppliedMigrationRecord::with_timestamp("blog.AuthorMigration", 2))
            .unwrap();

        let markers = store.applied_migrations().unwrap();
        assert_eq!(markers, vec![first]);
    }

    #[test]
    fn test_reopen_persists_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = StorageEngine::open(StorageConfig::new(dir.path())).unwrap();
            store.begin().unwrap();
            store.create("Author", fields(&[("id", json!(1))])).unwrap();
            store.commit().unwrap();
        }

        let store = StorageEngine::open(StorageConfig::new(dir.path())).unwrap();
        assert_eq!(store.count("Author").unwrap(), 1);
        assert!(store
            .find_existing("Author", &[("id", json!(1))])
            .unwrap()
            .is_some());
        assert_eq!(store.create("Author", Fields::new()).unwrap().id, 2);
    }
}
