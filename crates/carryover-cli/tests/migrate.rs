//! Runs the migrate command against files on disk.

use std::path::Path;

use carryover_cli::{run, Error, MigrateConfig};
use carryover_core::{RecordStore, StorageConfig, StorageEngine};

const LEGACY: &str = "
    CREATE TABLE authors (id INTEGER PRIMARY KEY, Firstname TEXT, Lastname TEXT);
    INSERT INTO authors VALUES (1, 'Ada', 'Lovelace');
    INSERT INTO authors VALUES (2, 'Alan', 'Turing');
    CREATE TABLE posts (id INTEGER PRIMARY KEY, Title TEXT, Author INTEGER);
    INSERT INTO posts VALUES (1, 'Notes', 1);
    INSERT INTO posts VALUES (2, 'Computing Machinery', 2);
";

const MANIFEST: &str = r#"{
    "entities": [
        { "name": "Author", "fields": ["id", "firstname", "lastname"] },
        { "name": "Post", "fields": ["id", "title", "author"] }
    ],
    "installed": ["blog"],
    "roots": {
        "blog": [
            { "id": "blog.PostMigration", "target": "Post",
              "query": "SELECT id, Title AS title, Author AS author FROM posts",
              "columns": [{ "column": "author", "target": "Author", "attr": "id", "foreign_key": true }] },
            { "id": "blog.AuthorMigration", "target": "Author",
              "query": "SELECT id, Firstname AS firstname, Lastname AS lastname FROM authors",
              "identity": "id" }
        ]
    }
}"#;

fn setup(dir: &Path) -> MigrateConfig {
    let legacy = dir.join("legacy.db");
    let conn = rusqlite::Connection::open(&legacy).unwrap();
    conn.execute_batch(LEGACY).unwrap();
    drop(conn);

    let manifest = dir.join("carryover.json");
    std::fs::write(&manifest, MANIFEST).unwrap();

    MigrateConfig::new(legacy)
        .with_manifest(manifest)
        .with_data_path(dir.join("data"))
}

fn open_store(dir: &Path) -> StorageEngine {
    StorageEngine::open(StorageConfig::new(dir.join("data"))).unwrap()
}

#[test]
fn test_dry_run_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let report = run(&config).unwrap();
    assert!(!report.committed);
    assert_eq!(report.created(), 4);

    let store = open_store(dir.path());
    assert_eq!(store.count("Author").unwrap(), 0);
    assert!(store.applied_migrations().unwrap().is_empty());
}

#[test]
fn test_commit_writes_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path()).committing().with_query_log();

    let report = run(&config).unwrap();
    assert!(report.committed);

    let store = open_store(dir.path());
    assert_eq!(store.count("Author").unwrap(), 2);
    assert_eq!(store.count("Post").unwrap(), 2);
    assert_eq!(store.applied_migrations().unwrap().len(), 2);
}

#[test]
fn test_rerun_updates_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path()).committing().exclude("unused");

    run(&config).unwrap();
    let report = run(&config).unwrap();

    // authors have an identity, posts do not
    assert_eq!(report.updated(), 2);
    assert_eq!(report.created(), 2);
    assert!(report.results.iter().all(|r| r.rerun));
}

#[test]
fn test_excluding_every_root_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path()).committing().exclude("blog");

    let report = run(&config).unwrap();
    assert!(report.results.is_empty());
}

#[test]
fn test_missing_manifest_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path()).with_manifest(dir.path().join("nope.json"));

    assert!(matches!(run(&config), Err(Error::Config(_))));
}
