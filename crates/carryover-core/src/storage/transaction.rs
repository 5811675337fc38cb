//! Staged writes for the run-wide transaction scope.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::index::{index_key, record_prefixes};
use super::key::{entity_prefix, sequence_key, RecordKey};
use super::Record;
use crate::error::Error;
use crate::migration::AppliedMigrationRecord;
use sled::transaction::ConflictableTransactionError;
use sled::{Transactional, Tree};

/// Pending writes collected while a transaction is active.
///
/// Nothing touches the trees until [`Transaction::apply`], which writes every
/// staged change in one sled transaction. Dropping a transaction discards it.
#[derive(Debug, Default)]
pub(crate) struct Transaction {
    /// Staged record writes. `None` marks a deletion.
    records: BTreeMap<Vec<u8>, Option<Record>>,
    /// Staged applied markers keyed by class identifier.
    applied: BTreeMap<String, AppliedMigrationRecord>,
    /// Last id allocated per entity inside this transaction.
    sequences: HashMap<String, u64>,
    /// Index entries of the staged records, by index prefix.
    index: HashMap<Vec<u8>, BTreeSet<u64>>,
}

impl Transaction {
    /// Stage a record write.
    pub fn put_record(&mut self, record: Record) {
        let key = RecordKey::new(record.entity.clone(), record.id).encode();
        self.unindex(&key);
        for prefix in record_prefixes(&record) {
            self.index.entry(prefix).or_default().insert(record.id);
        }
        self.records.insert(key, Some(record));
    }

    /// Stage a record deletion.
    pub fn delete_record(&mut self, entity: &str, id: u64) {
        let key = RecordKey::new(entity, id).encode();
        self.unindex(&key);
        self.records.insert(key, None);
    }

    /// Drop the index entries of a previously staged record.
    fn unindex(&mut self, key: &[u8]) {
        if let Some(Some(old)) = self.records.get(key) {
            for prefix in record_prefixes(old) {
                if let Some(ids) = self.index.get_mut(&prefix) {
                    ids.remove(&old.id);
                    if ids.is_empty() {
                        self.index.remove(&prefix);
                    }
                }
            }
        }
    }

    /// Ids of staged records indexed under `prefix`.
    pub fn indexed(&self, prefix: &[u8]) -> impl Iterator<Item = u64> + '_ {
        self.index.get(prefix).into_iter().flatten().copied()
    }

    /// Look up a staged write. `Some(None)` means the record was deleted.
    pub fn staged(&self, entity: &str, id: u64) -> Option<Option<&Record>> {
        self.records
            .get(&RecordKey::new(entity, id).encode())
            .map(Option::as_ref)
    }

    /// Staged writes for one entity type in key order.
    pub fn staged_for_entity<'a>(
        &'a self,
        entity: &str,
    ) -> impl Iterator<Item = (&'a Vec<u8>, Option<&'a Record>)> + 'a {
        let prefix = entity_prefix(entity);
        self.records
            .range(prefix.clone()..)
            .take_while(move |(key, _)| key.starts_with(&prefix))
            .map(|(key, record)| (key, record.as_ref()))
    }

    /// Stage an applied marker unless one is already staged.
    pub fn record_applied(&mut self, applied: &AppliedMigrationRecord) {
        self.applied
            .entry(applied.class_identifier.clone())
            .or_insert_with(|| applied.clone());
    }

    /// Check for a staged applied marker.
    pub fn has_applied(&self, class_identifier: &str) -> bool {
        self.applied.contains_key(class_identifier)
    }

    /// Staged applied markers.
    pub fn applied(&self) -> impl Iterator<Item = &AppliedMigrationRecord> {
        self.applied.values()
    }

    /// Allocate the next id for an entity given the last committed one.
    pub fn allocate_id(&mut self, entity: &str, committed_last: u64) -> u64 {
        let last = self
            .sequences
            .entry(entity.to_string())
            .or_insert(committed_last);
        *last = (*last).max(committed_last) + 1;
        *last
    }

    /// Number of staged operations.
    pub fn op_count(&self) -> usize {
        self.records.len() + self.applied.len()
    }

    /// Write every staged change atomically.
    ///
    /// Index entries of overwritten or deleted records are removed before
    /// the entries of the new records are written.
    pub fn apply(
        self,
        records: &Tree,
        applied: &Tree,
        meta: &Tree,
        index: &Tree,
    ) -> Result<(), Error> {
        if self.op_count() == 0 && self.sequences.is_empty() {
            return Ok(());
        }

        let mut record_ops = Vec::with_capacity(self.records.len());
        for (key, record) in &self.records {
            let bytes = match record {
                Some(record) => Some(record.to_bytes()?),
                None => None,
            };
            record_ops.push((key.clone(), bytes));
        }

        let index_ops: Vec<Vec<u8>> = self
            .records
            .values()
            .flatten()
            .flat_map(|record| {
                record_prefixes(record)
                    .into_iter()
                    .map(move |prefix| index_key(&prefix, record.id))
            })
            .collect();

        let mut applied_ops = Vec::with_capacity(self.applied.len());
        for (class_identifier, marker) in &self.applied {
            applied_ops.push((class_identifier.as_bytes().to_vec(), marker.to_bytes()?));
        }

        let sequence_ops: Vec<(Vec<u8>, [u8; 8])> = self
            .sequences
            .iter()
            .map(|(entity, last)| (sequence_key(entity), last.to_be_bytes()))
            .collect();

        let result: Result<(), sled::transaction::TransactionError<Error>> =
            (records, applied, meta, index).transaction(|(records_tx, applied_tx, meta_tx, index_tx)| {
                for (key, bytes) in &record_ops {
                    if let Some(old) = records_tx.get(key.as_slice())? {
                        let old = Record::from_bytes(&old)
                            .map_err(ConflictableTransactionError::Abort)?;
                        for prefix in record_prefixes(&old) {
                            index_tx.remove(index_key(&prefix, old.id))?;
                        }
                    }
                    match bytes {
                        Some(bytes) => {
                            records_tx.insert(key.as_slice(), bytes.as_slice())?;
                        }
                        None => {
                            records_tx.remove(key.as_slice())?;
                        }
                    }
                }
                for (key, bytes) in &applied_ops {
                    applied_tx.insert(key.as_slice(), bytes.as_slice())?;
                }
                for key in &index_ops {
                    index_tx.insert(key.as_slice(), &[][..])?;
                }
                for (key, last) in &sequence_ops {
                    meta_tx.insert(key.as_slice(), &last[..])?;
                }
                Ok::<(), ConflictableTransactionError<Error>>(())
            });

        match result {
            Ok(()) => Ok(()),
            Err(sled::transaction::TransactionError::Abort(e)) => Err(e),
            Err(sled::transaction::TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::index::index_prefix;
    use crate::storage::Fields;

    #[test]
    fn test_allocate_id_continues_committed_sequence() {
        let mut tx = Transaction::default();
        assert_eq!(tx.allocate_id("Author", 0), 1);
        assert_eq!(tx.allocate_id("Author", 0), 2);
        assert_eq!(tx.allocate_id("Post", 5), 6);
    }

    #[test]
    fn test_staged_lookup() {
        let mut tx = Transaction::default();
        tx.put_record(Record::new("Author", 1, Fields::new()));
        tx.delete_record("Author", 2);

        assert!(matches!(tx.staged("Author", 1), Some(Some(_))));
        assert!(matches!(tx.staged("Author", 2), Some(None)));
        assert!(tx.staged("Author", 3).is_none());
        assert_eq!(tx.staged_for_entity("Author").count(), 2);
        assert_eq!(tx.staged_for_entity("Post").count(), 0);
    }

    #[test]
    fn test_staged_index_follows_overwrites() {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), serde_json::json!(7));
        let mut tx = Transaction::default();
        tx.put_record(Record::new("Author", 1, fields.clone()));

        let seven = index_prefix("Author", "id", "7");
        assert_eq!(tx.indexed(&seven).collect::<Vec<_>>(), vec![1]);

        fields.insert("id".to_string(), serde_json::json!(8));
        tx.put_record(Record::new("Author", 1, fields));
        assert_eq!(tx.indexed(&seven).count(), 0);
        assert_eq!(tx.indexed(&index_prefix("Author", "id", "8")).count(), 1);

        tx.delete_record("Author", 1);
        assert_eq!(tx.indexed(&index_prefix("Author", "id", "8")).count(), 0);
    }

    #[test]
    fn test_record_applied_keeps_first() {
        let mut tx = Transaction::default();
        let first = AppliedMigrationRecord::with_timestamp("blog.AuthorMigration", 1);
        let second = AppliedMigrationRecord::with_timestamp("blog.AuthorMigration", 2);
        tx.record_applied(&first);
        tx.record_applied(&second);

        assert_eq!(tx.applied().count(), 1);
        assert_eq!(tx.applied().next().unwrap().created_at, 1);
    }
}
