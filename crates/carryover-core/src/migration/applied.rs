//! Applied migration markers.

use crate::error::Error;
use crate::storage::key::current_timestamp;
use serde::{Deserialize, Serialize};

/// Persisted proof that a migration definition has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigrationRecord {
    /// Stable identifier of the migration definition.
    pub class_identifier: String,
    /// When the definition first ran (microseconds since epoch).
    pub created_at: u64,
}

impl AppliedMigrationRecord {
    /// Create a marker stamped with the current time.
    pub fn new(class_identifier: impl Into<String>) -> Self {
        Self::with_timestamp(class_identifier, current_timestamp())
    }

    /// Create a marker with an explicit timestamp.
    pub fn with_timestamp(class_identifier: impl Into<String>, created_at: u64) -> Self {
        Self {
            class_identifier: class_identifier.into(),
            created_at,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
