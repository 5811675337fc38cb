//! Migration orchestration engine.
//!
//! Moves legacy rows into the target schema:
//! - Attribute specs describe how each legacy column maps onto the target
//! - The registry collects definitions from named roots
//! - The sorter orders definitions so relation targets are migrated first
//! - The executor runs each definition row by row, firing lifecycle hooks
//! - The coordinator wraps the whole run in one transaction
//!
//! # Example
//!
//! ```ignore
//! use carryover_core::migration::{DiscoveryOptions, MigrationRegistry, TransactionCoordinator};
//!
//! let mut registry = MigrationRegistry::new(catalog.clone());
//! registry.discover(&manifest, &DiscoveryOptions::default())?;
//!
//! let plan = registry.plan()?;
//! let report = TransactionCoordinator::new(&store, &legacy, &catalog)
//!     .run(&plan, true, false)?;
//! println!("created {} records", report.created());
//! ```

pub mod applied;
pub mod attribute;
pub mod coordinator;
pub mod definition;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod manifest;
pub mod registry;
pub mod sorter;

pub use applied::AppliedMigrationRecord;
pub use attribute::{AttributeSpec, AttributeSpecBuilder, RelationKind, DEFAULT_DELIMITER};
pub use coordinator::{RunReport, TransactionCoordinator};
pub use definition::MigrationDefinition;
pub use error::MigrationError;
pub use executor::{ExecutionResult, MigrationExecutor, ProgressObserver, RowError};
pub use hooks::{Draft, MigrationHooks, NoopHooks, RowRecovery};
pub use manifest::ManifestFile;
pub use registry::{DiscoveryOptions, DiscoverySource, MigrationRegistry, StaticManifest};
pub use sorter::{DependencySorter, ExecutionPlan};
