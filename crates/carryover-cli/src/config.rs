//! Migration run configuration.

use carryover_core::DiscoveryOptions;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Default manifest file name.
pub const DEFAULT_MANIFEST_PATH: &str = "carryover.json";

/// Default target store directory.
pub const DEFAULT_DATA_PATH: &str = "./data";

/// Configuration of one migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    /// JSON manifest declaring entities and migration roots.
    pub manifest_path: PathBuf,

    /// SQLite legacy database.
    pub legacy_path: PathBuf,

    /// Target store directory.
    pub data_path: PathBuf,

    /// Commit the changes. Without it every run is a dry run.
    pub commit: bool,

    /// Trace every persistence call.
    pub log_queries: bool,

    /// Roots to load in addition to the installed ones.
    pub includes: Vec<String>,

    /// Roots to skip.
    pub excludes: Vec<String>,
}

impl MigrateConfig {
    /// Create a dry-run configuration reading from `legacy_path`.
    pub fn new(legacy_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: PathBuf::from(DEFAULT_MANIFEST_PATH),
            legacy_path: legacy_path.into(),
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            commit: false,
            log_queries: false,
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    /// Set the manifest path.
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = path.into();
        self
    }

    /// Set the target store directory.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Commit the changes.
    pub fn committing(mut self) -> Self {
        self.commit = true;
        self
    }

    /// Trace every persistence call.
    pub fn with_query_log(mut self) -> Self {
        self.log_queries = true;
        self
    }

    /// Load an extra root.
    pub fn include(mut self, root: impl Into<String>) -> Self {
        self.includes.push(root.into());
        self
    }

    /// Skip a root.
    pub fn exclude(mut self, root: impl Into<String>) -> Self {
        self.excludes.push(root.into());
        self
    }

    /// Discovery options for the registry.
    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            includes: self.includes.clone(),
            excludes: self.excludes.clone(),
        }
    }
}

/// Retired command words still accepted in front of the flags.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeprecatedCommand {
    /// The name of the migrate command before it became the default action.
    #[value(name = "migrate-legacy-data")]
    MigrateLegacyData,
}

impl DeprecatedCommand {
    /// Name as typed on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::MigrateLegacyData => "migrate-legacy-data",
        }
    }
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "carryover")]
#[command(version, about = "Migrate legacy records into a new schema", long_about = None)]
pub struct Args {
    /// Deprecated command word, e.g. `carryover migrate-legacy-data --legacy old.db`.
    #[arg(value_enum, hide = true)]
    pub command: Option<DeprecatedCommand>,

    /// Commit the changes to the target store.
    #[arg(long)]
    pub commit: bool,

    /// Root to skip (repeatable).
    #[arg(long, value_name = "ROOT")]
    pub exclude: Vec<String>,

    /// Root to load in addition to the installed ones (repeatable).
    #[arg(long, value_name = "ROOT")]
    pub include: Vec<String>,

    /// Log every persistence call.
    #[arg(long)]
    pub logquery: bool,

    /// Manifest declaring entities and migration roots.
    #[arg(long, default_value = DEFAULT_MANIFEST_PATH)]
    pub manifest: PathBuf,

    /// SQLite legacy database.
    #[arg(long)]
    pub legacy: PathBuf,

    /// Target store directory.
    #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,
}

impl Args {
    /// Deprecation notice for a retired command word, if one was given.
    pub fn deprecation(&self) -> Option<String> {
        self.command.map(|command| {
            format!(
                "`carryover {}` is deprecated in favour of `carryover`",
                command.name()
            )
        })
    }

    /// Convert command-line arguments to a run configuration.
    pub fn into_config(self) -> MigrateConfig {
        MigrateConfig {
            manifest_path: self.manifest,
            legacy_path: self.legacy,
            data_path: self.data_path,
            commit: self.commit,
            log_queries: self.logquery,
            includes: self.include,
            excludes: self.exclude,
        }
    }
}
