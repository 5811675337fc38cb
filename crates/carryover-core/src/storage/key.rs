//! Key encoding for the record and metadata trees.

/// Separator between the entity name and the record id.
const SEPARATOR: u8 = 0;

/// Prefix for per-entity id sequences in the meta tree.
const SEQUENCE_PREFIX: &[u8] = b"seq:";

/// Key of a stored record.
///
/// Key format: `[entity name][0x00][id (8 bytes, big-endian)]`
///
/// Big-endian encoding keeps records of one entity contiguous and in id order,
/// so a prefix scan returns them in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Entity type name.
    pub entity: String,
    /// Store-assigned id.
    pub id: u64,
}

impl RecordKey {
    /// Create a new record key.
    pub fn new(entity: impl Into<String>, id: u64) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }

    /// Encode the key to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = entity_prefix(&self.entity);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf
    }
}

/// Prefix shared by every record key of an entity type.
pub fn entity_prefix(entity: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entity.len() + 9);
    buf.extend_from_slice(entity.as_bytes());
    buf.push(SEPARATOR);
    buf
}

/// Meta tree key holding the last allocated id of an entity type.
pub fn sequence_key(entity: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SEQUENCE_PREFIX.len() + entity.len());
    buf.extend_from_slice(SEQUENCE_PREFIX);
    buf.extend_from_slice(entity.as_bytes());
    buf
}

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let key = RecordKey::new("Author", 42).encode();
        assert_eq!(&key[..7], b"Author\0");
        assert_eq!(&key[7..], &42u64.to_be_bytes());
    }

    #[test]
    fn test_lexicographic_ordering() {
        let key1 = RecordKey::new("Post", 2).encode();
        let key2 = RecordKey::new("Post", 10).encode();
        let key3 = RecordKey::new("Post", 256).encode();

        assert!(key1 < key2);
        assert!(key2 < key3);
    }

    #[test]
    fn test_prefix_separates_entities() {
        let post = RecordKey::new("Post", 1).encode();
        let posting = RecordKey::new("Posting", 1).encode();

        assert!(post.starts_with(&entity_prefix("Post")));
        assert!(!posting.starts_with(&entity_prefix("Post")));
    }
}
