//! Core error types.

use thiserror::Error;

/// Storage and source errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Legacy source error.
    #[error("legacy source error: {0}")]
    Source(#[from] rusqlite::Error),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Record not found.
    #[error("record not found: {entity} #{id}")]
    NotFound {
        /// Entity type name.
        entity: String,
        /// Store-assigned record id.
        id: u64,
    },

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}
