//! Attribute value index for identity and relation lookups.
//!
//! Maps `(entity, attribute, textual value)` to record ids so that
//! [`RecordStore::find_existing`](super::RecordStore::find_existing) does not
//! scan every record of an entity type.

use std::collections::BTreeSet;

use sled::Tree;

use super::key::entity_prefix;
use super::record::lookup_text;
use super::Record;
use crate::error::Error;

/// Tree name for the attribute value index.
pub const INDEX_TREE: &str = "index:value";

/// Meta tree key marking the index as built.
pub const INDEX_READY_KEY: &[u8] = b"index:ready";

/// Build the index prefix for one attribute value.
///
/// Format: `[entity][0x00][attr_len:2][attr][text_len:4][text]`
///
/// Every index key is the prefix followed by the big-endian record id, so a
/// prefix scan yields the matching ids in ascending order.
pub fn index_prefix(entity: &str, attr: &str, text: &str) -> Vec<u8> {
    let mut key = entity_prefix(entity);
    key.reserve(attr.len() + text.len() + 6);

    key.extend_from_slice(&(attr.len() as u16).to_be_bytes());
    key.extend_from_slice(attr.as_bytes());

    key.extend_from_slice(&(text.len() as u32).to_be_bytes());
    key.extend_from_slice(text.as_bytes());

    key
}

/// Build a full index key.
pub fn index_key(prefix: &[u8], id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 8);
    key.extend_from_slice(prefix);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Extract the record id from an index key built on `prefix_len` bytes.
fn id_from_key(key: &[u8], prefix_len: usize) -> Option<u64> {
    if key.len() != prefix_len + 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[prefix_len..]);
    Some(u64::from_be_bytes(buf))
}

/// Index prefixes for every non-null attribute of a record.
pub fn record_prefixes(record: &Record) -> Vec<Vec<u8>> {
    record
        .fields
        .iter()
        .filter_map(|(attr, value)| {
            lookup_text(value).map(|text| index_prefix(&record.entity, attr, &text))
        })
        .collect()
}

/// Committed side of the attribute value index.
pub struct ValueIndex {
    tree: Tree,
}

impl ValueIndex {
    /// Wrap the index tree.
    pub fn new(tree: Tree) -> Self {
        Self { tree }
    }

    /// The underlying tree, for transactional maintenance.
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Committed ids indexed under `prefix`.
    pub fn lookup(&self, prefix: &[u8]) -> Result<BTreeSet<u64>, Error> {
        let mut ids = BTreeSet::new();
        for item in self.tree.scan_prefix(prefix) {
            let (key, _) = item?;
            if let Some(id) = id_from_key(&key, prefix.len()) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    /// Index every committed record unless `meta` says the index is built.
    ///
    /// Stores written before the index existed are indexed on first open.
    pub fn ensure_built(&self, records: &Tree, meta: &Tree) -> Result<(), Error> {
        if meta.contains_key(INDEX_READY_KEY)? {
            return Ok(());
        }

        self.tree.clear()?;
        let mut indexed = 0usize;
        for item in records.iter() {
            let (_, bytes) = item?;
            let record = Record::from_bytes(&bytes)?;
            for prefix in record_prefixes(&record) {
                self.tree.insert(index_key(&prefix, record.id), &[][..])?;
            }
            indexed += 1;
        }
        meta.insert(INDEX_READY_KEY, &[1u8][..])?;

        if indexed > 0 {
            tracing::info!(records = indexed, "rebuilt attribute value index");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Fields;
    use serde_json::json;

    #[test]
    fn test_prefixes_separate_attributes_and_values() {
        let a = index_prefix("Author", "id", "12");
        let b = index_prefix("Author", "id1", "2");
        let c = index_prefix("Author", "id", "1");

        assert_ne!(a, b);
        assert!(!a.starts_with(&c));
        assert!(a.starts_with(&entity_prefix("Author")));
    }

    #[test]
    fn test_id_is_read_back_from_key() {
        let prefix = index_prefix("Post", "author", "7");
        let key = index_key(&prefix, 300);

        assert_eq!(id_from_key(&key, prefix.len()), Some(300));
        assert_eq!(id_from_key(&key[..key.len() - 1], prefix.len()), None);
    }

    #[test]
    fn test_null_attributes_are_not_indexed() {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), json!(" 7 "));
        fields.insert("author".to_string(), serde_json::Value::Null);
        let record = Record::new("Comment", 1, fields);

        assert_eq!(
            record_prefixes(&record),
            vec![index_prefix("Comment", "id", "7")]
        );
    }

    #[test]
    fn test_ensure_built_indexes_existing_records() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let records = db.open_tree("records").unwrap();
        let meta = db.open_tree("meta").unwrap();
        let index = ValueIndex::new(db.open_tree(INDEX_TREE).unwrap());

        let mut fields = Fields::new();
        fields.insert("id".to_string(), json!(42));
        let record = Record::new("Author", 3, fields);
        records
            .insert(
                crate::storage::key::RecordKey::new("Author", 3).encode(),
                record.to_bytes().unwrap(),
            )
            .unwrap();

        index.ensure_built(&records, &meta).unwrap();

        let ids = index.lookup(&index_prefix("Author", "id", "42")).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![3]);
        assert!(meta.contains_key(INDEX_READY_KEY).unwrap());
    }
}
