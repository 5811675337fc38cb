//! Migration-specific error types.

use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// An attribute spec or definition is misconfigured.
    #[error("improperly configured: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// Migration definitions depend on each other in a cycle.
    #[error("dependency cycle between migrations: {}", .cycle.join(" -> "))]
    DependencyCycle {
        /// Definition ids along the cycle, first repeated at the end.
        cycle: Vec<String>,
    },

    /// A related record could not be resolved and the attribute does not skip missing ones.
    #[error("missing related {target} with {key} for attribute `{attribute}`")]
    MissingRelation {
        /// Legacy column holding the relation.
        attribute: String,
        /// Related entity type.
        target: String,
        /// Lookup that found nothing.
        key: String,
    },

    /// A row could not be transformed.
    #[error("transformation failed: {message}")]
    Transformation {
        /// Description of the failure.
        message: String,
    },

    /// An abstract definition was asked to run.
    #[error("migration {migration} is abstract and cannot be executed")]
    AbstractDefinition {
        /// Definition id.
        migration: String,
    },

    /// A discovery source failed to list a root.
    #[error("discovery failed for root {root}: {message}")]
    Discovery {
        /// Root name.
        root: String,
        /// Description of the failure.
        message: String,
    },

    /// A row failed fatally; carries where it happened.
    #[error("migration {migration} failed at row {row}: {source}")]
    Row {
        /// Definition id.
        migration: String,
        /// Row identity (`id=9`) or position (`#3`).
        row: String,
        /// The underlying failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// Storage or legacy source error.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

impl MigrationError {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        MigrationError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a transformation error, usable from hooks.
    pub fn transformation(message: impl Into<String>) -> Self {
        MigrationError::Transformation {
            message: message.into(),
        }
    }

    /// Whether this error, or the row failure it wraps, is a missing relation.
    pub fn is_missing_relation(&self) -> bool {
        match self {
            MigrationError::MissingRelation { .. } => true,
            MigrationError::Row { source, .. } => source.is_missing_relation(),
            _ => false,
        }
    }

    /// The innermost error, looking through row context.
    pub fn root_cause(&self) -> &MigrationError {
        match self {
            MigrationError::Row { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
