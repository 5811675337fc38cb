//! Transaction coordinator - runs a whole plan all-or-nothing.

use tracing::{error, info, warn};

use super::error::MigrationError;
use super::executor::{ExecutionResult, MigrationExecutor, ProgressObserver};
use super::sorter::ExecutionPlan;
use crate::catalog::Catalog;
use crate::source::LegacySource;
use crate::storage::{QueryLog, RecordStore};

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Per-definition results in execution order.
    pub results: Vec<ExecutionResult>,
    /// Whether the changes were committed.
    pub committed: bool,
}

impl RunReport {
    /// Records created across all definitions.
    pub fn created(&self) -> usize {
        self.results.iter().map(|r| r.created).sum()
    }

    /// Records updated across all definitions.
    pub fn updated(&self) -> usize {
        self.results.iter().map(|r| r.updated).sum()
    }

    /// Rows skipped across all definitions.
    pub fn skipped(&self) -> usize {
        self.results.iter().map(|r| r.skipped).sum()
    }
}

/// Rolls the store back unless disarmed.
struct RollbackGuard<'a> {
    store: &'a dyn RecordStore,
    armed: bool,
}

impl<'a> RollbackGuard<'a> {
    fn new(store: &'a dyn RecordStore) -> Self {
        Self { store, armed: true }
    }

    fn commit(mut self) -> Result<(), MigrationError> {
        self.armed = false;
        self.store.commit()?;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), MigrationError> {
        self.armed = false;
        self.store.rollback()?;
        Ok(())
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.store.in_transaction() {
            if let Err(e) = self.store.rollback() {
                error!(error = %e, "Rollback failed");
            }
        }
    }
}

/// Runs an execution plan inside one store transaction.
pub struct TransactionCoordinator<'a> {
    store: &'a dyn RecordStore,
    source: &'a dyn LegacySource,
    catalog: &'a Catalog,
    progress: Option<&'a dyn ProgressObserver>,
}

impl<'a> TransactionCoordinator<'a> {
    /// Create a coordinator.
    pub fn new(
        store: &'a dyn RecordStore,
        source: &'a dyn LegacySource,
        catalog: &'a Catalog,
    ) -> Self {
        Self {
            store,
            source,
            catalog,
            progress: None,
        }
    }

    /// Report every migrated element to `observer`.
    pub fn with_progress(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Run every definition of the plan.
    ///
    /// Changes are committed only when `commit` is set and every definition
    /// succeeds; otherwise the store is rolled back. `log_queries` traces each
    /// persistence call on the `carryover::query` target.
    pub fn run(
        &self,
        plan: &ExecutionPlan,
        commit: bool,
        log_queries: bool,
    ) -> Result<RunReport, MigrationError> {
        let logged;
        let store: &dyn RecordStore = if log_queries {
            logged = QueryLog::new(self.store);
            &logged
        } else {
            self.store
        };

        store.begin()?;
        let guard = RollbackGuard::new(store);

        let mut executor = MigrationExecutor::new(store, self.source, self.catalog);
        if let Some(observer) = self.progress {
            executor = executor.with_progress(observer);
        }

        let mut report = RunReport::default();
        for definition in plan.iter() {
            match executor.execute(definition) {
                Ok(result) => report.results.push(result),
                Err(e) => {
                    error!(migration = definition.id(), error = %e, "Migration failed, rolling back");
                    return Err(e);
                }
            }
        }

        if commit {
            guard.commit()?;
            report.committed = true;
            info!(
                migrations = report.results.len(),
                created = report.created(),
                updated = report.updated(),
                "Changes committed"
            );
        } else {
            guard.rollback()?;
            warn!("not committing, no changes were written");
        }

        Ok(report)
    }
}
