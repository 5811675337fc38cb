//! SQLite legacy source.

use std::path::Path;

use super::{LegacySource, Row};
use crate::error::Error;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Number, Value};

/// Legacy source backed by a SQLite database.
pub struct SqliteSource {
    conn: Connection,
}

impl SqliteSource {
    /// Open an existing legacy database read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Create a new in-memory database, mostly for fixtures.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Execute a batch of SQL statements (schema and fixture data).
    pub fn execute_batch(&self, sql: &str) -> Result<(), Error> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl LegacySource for SqliteSource {
    fn fetch(&self, query: &str) -> Result<Vec<Row>, Error> {
        let mut stmt = self.conn.prepare(query)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut legacy = Row::new();
            for (index, column) in columns.iter().enumerate() {
                legacy.set(column.as_str(), to_value(row.get_ref(index)?));
            }
            out.push(legacy);
        }

        tracing::debug!(rows = out.len(), "legacy query fetched");
        Ok(out)
    }
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> SqliteSource {
        let source = SqliteSource::open_in_memory().unwrap();
        source
            .execute_batch(
                r#"
            CREATE TABLE authors (id INTEGER PRIMARY KEY, Firstname TEXT, Score REAL, Avatar BLOB);
            INSERT INTO authors VALUES (1, 'Ada', 1.5, x'cafe');
            INSERT INTO authors VALUES (2, NULL, NULL, NULL);
            "#,
            )
            .unwrap();
        source
    }

    #[test]
    fn test_fetch_maps_types() {
        let rows = source()
            .fetch("SELECT id, Firstname AS firstname, Score AS score, Avatar AS avatar FROM authors ORDER BY id")
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert_eq!(rows[0].get("firstname"), Some(&json!("Ada")));
        assert_eq!(rows[0].get("score"), Some(&json!(1.5)));
        assert_eq!(rows[0].get("avatar"), Some(&json!("cafe")));
        assert_eq!(rows[1].get("firstname"), Some(&Value::Null));
    }

    #[test]
    fn test_fetch_keeps_column_order() {
        let rows = source()
            .fetch("SELECT Firstname AS firstname, id FROM authors WHERE id = 1")
            .unwrap();
        let columns: Vec<_> = rows[0].iter().map(|(name, _)| name).collect();
        assert_eq!(columns, vec!["firstname", "id"]);
    }

    #[test]
    fn test_invalid_query_is_an_error() {
        assert!(matches!(
            source().fetch("SELECT * FROM missing_table"),
            Err(Error::Source(_))
        ));
    }
}
