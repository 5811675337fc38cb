//! carryover command-line front end.
//!
//! Loads a JSON manifest, discovers the migration definitions of its roots and
//! runs them against a SQLite legacy database and a sled target store.

pub mod config;
pub mod error;
pub mod migrate;
pub mod progress;

pub use config::{Args, DeprecatedCommand, MigrateConfig};
pub use error::Error;
pub use migrate::run;
pub use progress::StdoutProgress;
