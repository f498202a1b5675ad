//! # Migration Barrier Journey
//!
//! Tests that schema upgrades gate startup:
//! 1. A fresh data directory migrates to the current target
//! 2. A failing migration restores the pre-migration snapshot and refuses
//!    to start
//! 3. Data written before the failed upgrade survives it
//! 4. A database from a newer build is never opened

use engram_core::storage::{Migration, MigrationError, MIGRATIONS};
use engram_core::{
    schema_target_version, DocumentFilter, DocumentStore, DocumentType, EngramError,
    IngestRequest, MigrationRunner,
};
use engram_e2e_tests::{TestDataFactory, TestEngine, TestRepo};
use rusqlite::Connection;
use tempfile::TempDir;

fn half_applied(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("CREATE TABLE half_done (id INTEGER PRIMARY KEY);")?;
    conn.execute_batch("ALTER TABLE no_such_table ADD COLUMN x TEXT;")
}

fn adds_audit_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("CREATE TABLE audit_log (id INTEGER PRIMARY KEY, entry TEXT NOT NULL);")
}

fn runner_with(version: u32, up: fn(&Connection) -> rusqlite::Result<()>) -> MigrationRunner {
    let mut migrations = MIGRATIONS.to_vec();
    migrations.push(Migration {
        version,
        description: "journey migration",
        up,
    });
    MigrationRunner::new(migrations)
}

fn table_exists(data_dir: &std::path::Path, table: &str) -> bool {
    let conn = Connection::open(data_dir.join("engram.db")).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

#[test]
fn test_fresh_start_reaches_target_version() {
    let dir = TempDir::new().unwrap();

    let ctx = TestEngine::open_at(dir.path(), &MigrationRunner::default()).unwrap();

    let version = ctx.schema_version().unwrap();
    assert_eq!(version.version, schema_target_version());
    assert_eq!(version.applied.len(), MIGRATIONS.len());
}

#[tokio::test]
async fn test_failed_migration_rolls_back_and_blocks_startup() {
    let dir = TempDir::new().unwrap();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    let before_upgrade = {
        let ctx = TestEngine::open_at(dir.path(), &MigrationRunner::default()).unwrap();
        ctx.ingest(IngestRequest::new(repo.path()).repository("acme"))
            .await
            .unwrap();
        ctx.schema_version().unwrap().version
    };

    let broken = runner_with(schema_target_version() + 1, half_applied);
    let err = TestEngine::open_at(dir.path(), &broken).err().expect("startup must fail");

    match err {
        EngramError::MigrationFailure(MigrationError::Failed {
            version,
            restored,
            backup,
            ..
        }) => {
            assert_eq!(version, schema_target_version() + 1);
            assert!(restored);
            assert!(backup.expect("backup path").exists());
        }
        other => panic!("expected a migration failure, got {other:?}"),
    }
    assert!(!table_exists(dir.path(), "half_done"));

    // The previous build still starts and sees its data
    let ctx = TestEngine::open_at(dir.path(), &MigrationRunner::default()).unwrap();
    assert_eq!(ctx.schema_version().unwrap().version, before_upgrade);
    let filter = DocumentFilter::repository("acme").with_types(vec![DocumentType::Code]);
    assert!(ctx.storage.count(&filter).unwrap() >= 3);
}

#[test]
fn test_successful_upgrade_keeps_a_backup() {
    let dir = TempDir::new().unwrap();
    TestEngine::open_at(dir.path(), &MigrationRunner::default()).unwrap();

    let upgraded = runner_with(schema_target_version() + 1, adds_audit_table);
    let ctx = TestEngine::open_at(dir.path(), &upgraded).unwrap();

    assert_eq!(ctx.schema_version().unwrap().version, schema_target_version() + 1);
    assert!(table_exists(dir.path(), "audit_log"));
    let backups: Vec<_> = std::fs::read_dir(dir.path().join("backups")).unwrap().collect();
    assert!(!backups.is_empty());
}

#[test]
fn test_newer_database_is_refused() {
    let dir = TempDir::new().unwrap();
    let upgraded = runner_with(schema_target_version() + 1, adds_audit_table);
    TestEngine::open_at(dir.path(), &upgraded).unwrap();

    let err = TestEngine::open_at(dir.path(), &MigrationRunner::default())
        .err()
        .expect("older build must not open a newer schema");

    assert!(matches!(
        err,
        EngramError::MigrationFailure(MigrationError::NewerThanSupported { .. })
    ));
}
