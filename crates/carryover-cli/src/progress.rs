//! Progress output.

use carryover_core::{ProgressObserver, Record};

/// Prints one line per migrated element to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutProgress;

/// Format the progress line for one element.
pub fn progress_line(migration: &str, index: usize, record: &Record) -> String {
    format!(
        "Migrating element {index} of {migration} ({} #{})",
        record.entity, record.id
    )
}

impl ProgressObserver for StdoutProgress {
    fn element_migrated(&self, migration: &str, index: usize, record: &Record, _created: bool) {
        println!("{}", progress_line(migration, index, record));
    }
}
