//! carryover core - legacy data migration orchestration.
//!
//! This crate discovers migration definitions, resolves their attribute specs,
//! orders them by dependency and runs them inside a single all-or-nothing
//! transaction against a target record store.

pub mod catalog;
pub mod error;
pub mod migration;
pub mod source;
pub mod storage;

pub use catalog::{Catalog, EntityDef};
pub use error::Error;
pub use migration::{
    AppliedMigrationRecord, AttributeSpec, AttributeSpecBuilder, DependencySorter,
    DiscoveryOptions, DiscoverySource, Draft, ExecutionPlan, ExecutionResult, ManifestFile,
    MigrationDefinition, MigrationError, MigrationExecutor, MigrationHooks, MigrationRegistry,
    NoopHooks, ProgressObserver, RelationKind, RowRecovery, RunReport, StaticManifest,
    TransactionCoordinator,
};
pub use source::{LegacySource, Row, SqliteSource};
pub use storage::{Fields, QueryLog, Record, RecordStore, StorageConfig, StorageEngine};

/// Field values are plain JSON values.
pub use serde_json::Value;
