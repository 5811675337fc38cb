//! CLI error types.

use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage, legacy source or manifest error.
    #[error("{0}")]
    Core(#[from] carryover_core::Error),

    /// Migration error.
    #[error("{0}")]
    Migration(#[from] carryover_core::MigrationError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
