//! Legacy data sources.
//!
//! A migration definition carries a query; the [`LegacySource`] runs it and
//! hands back ordered rows.

mod sqlite;

pub use sqlite::SqliteSource;

use crate::error::Error;
use serde_json::Value;

/// Reads rows out of the legacy system.
pub trait LegacySource {
    /// Run a query and return every row in result order.
    fn fetch(&self, query: &str) -> Result<Vec<Row>, Error>;
}

/// One legacy row: ordered `(column, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Get a column as text, if it holds a string.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Set a column, replacing an existing value in place or appending.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Remove a column and return its value.
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let index = self.columns.iter().position(|(name, _)| name == column)?;
        Some(self.columns.remove(index).1)
    }

    /// Iterate columns in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Human-readable identity used in error reports.
    ///
    /// Uses the identity column when present, otherwise the row position.
    pub fn label(&self, identity: &str, position: usize) -> String {
        match self.get(identity) {
            Some(Value::String(s)) => format!("{identity}={s}"),
            Some(value) if !value.is_null() => format!("{identity}={value}"),
            _ => format!("#{}", position + 1),
        }
    }
}

impl<S: Into<String>> FromIterator<(S, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (S, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}
