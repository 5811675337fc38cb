//! The migrate command.

use carryover_core::{
    ManifestFile, MigrationRegistry, RunReport, SqliteSource, StorageConfig, StorageEngine,
    TransactionCoordinator,
};

use crate::config::MigrateConfig;
use crate::error::Error;
use crate::progress::StdoutProgress;

/// Discover, order and run every migration of the manifest.
pub fn run(config: &MigrateConfig) -> Result<RunReport, Error> {
    if !config.manifest_path.is_file() {
        return Err(Error::Config(format!(
            "manifest {} does not exist",
            config.manifest_path.display()
        )));
    }
    if !config.legacy_path.is_file() {
        return Err(Error::Config(format!(
            "legacy database {} does not exist",
            config.legacy_path.display()
        )));
    }

    println!("Importing migrations ...");
    let manifest = ManifestFile::load(&config.manifest_path)?;
    let catalog = manifest.catalog();
    let mut registry = MigrationRegistry::new(catalog.clone());
    let discovered = registry.discover(&manifest, &config.discovery_options())?;
    let plan = registry.plan()?;
    tracing::info!(discovered, planned = plan.len(), "migrations imported");

    println!("Running migrations ...");
    let legacy = SqliteSource::open(&config.legacy_path)?;
    let store = StorageEngine::open(StorageConfig::new(&config.data_path))?;
    let progress = StdoutProgress;
    let report = TransactionCoordinator::new(&store, &legacy, &catalog)
        .with_progress(&progress)
        .run(&plan, config.commit, config.log_queries)?;
    store.flush()?;

    println!("Done");
    Ok(report)
}
