//! Database Migrations
//!
//! Ordered schema migrations. Each pending migration runs in its own
//! transaction after a snapshot of the database has been written; a failure
//! restores the snapshot and aborts.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::backup::{backup_to, cleanup_old_backups, restore_from, BACKUPS_TO_KEEP};

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: documents, embeddings, FTS5 tokens, file records",
        up: migrate_v1_initial_schema,
    },
    Migration {
        version: 2,
        description: "Initiatives with single-focus constraint",
        up: migrate_v2_initiatives,
    },
    Migration {
        version: 3,
        description: "Normalize legacy session summaries and insight status",
        up: migrate_v3_normalize_legacy,
    },
];

/// A database migration
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// Applied inside a transaction
    pub up: fn(&Connection) -> rusqlite::Result<()>,
}

/// Migration runner errors
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A migration function failed
    #[error("v{version} ({description}) failed: {reason}; restored from backup: {restored}")]
    Failed {
        version: u32,
        description: String,
        reason: String,
        restored: bool,
        backup: Option<PathBuf>,
    },
    /// Snapshot before migration could not be written; nothing was applied
    #[error("backup before v{version} failed: {reason}")]
    Backup { version: u32, reason: String },
    /// Database newer than this build understands
    #[error("stored schema version {stored} is newer than supported version {supported}")]
    NewerThanSupported { stored: u32, supported: u32 },
    /// Database error outside a migration body
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// One applied migration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigration {
    pub version: u32,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

/// Stored schema version plus history
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaVersion {
    pub version: u32,
    pub applied: Vec<AppliedMigration>,
}

/// Stored version against what this build would migrate to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub current_version: u32,
    pub target_version: u32,
    pub pending: Vec<u32>,
    pub applied: Vec<AppliedMigration>,
}

/// Result of a migration run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub applied: Vec<u32>,
}

// ============================================================================
// RUNNER
// ============================================================================

/// Applies pending migrations to a database file
pub struct MigrationRunner {
    migrations: Vec<Migration>,
    keep_backups: usize,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new(MIGRATIONS.to_vec())
    }
}

impl MigrationRunner {
    /// Runner over a custom migration list
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self {
            migrations,
            keep_backups: BACKUPS_TO_KEEP,
        }
    }

    /// Highest registered version
    pub fn target_version(&self) -> u32 {
        self.migrations.last().map(|m| m.version).unwrap_or(0)
    }

    /// Report the schema state without applying anything
    pub fn status(&self, conn: &Connection) -> Result<MigrationStatus, MigrationError> {
        ensure_version_table(conn)?;
        let stored = schema_version(conn)?;
        let pending = self
            .migrations
            .iter()
            .map(|m| m.version)
            .filter(|v| *v > stored.version)
            .collect();
        Ok(MigrationStatus {
            current_version: stored.version,
            target_version: self.target_version(),
            pending,
            applied: stored.applied,
        })
    }

    /// Bring the database at `db_path` to the target version
    ///
    /// Snapshots land in a `backups` directory next to the database.
    pub fn run(&self, db_path: &Path) -> Result<MigrationReport, MigrationError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MigrationError::Backup {
                version: 0,
                reason: e.to_string(),
            })?;
        }
        let backup_dir = backups_dir(db_path);
        let mut conn = Connection::open(db_path)?;
        ensure_version_table(&conn)?;

        let current = current_version(&conn)?;
        let target = self.target_version();
        if current > target {
            return Err(MigrationError::NewerThanSupported {
                stored: current,
                supported: target,
            });
        }

        let mut report = MigrationReport {
            from_version: current,
            to_version: current,
            applied: Vec::new(),
        };

        for migration in self.migrations.iter().filter(|m| m.version > current) {
            let backup = backup_dir.join(format!(
                "backup_{}_pre_v{:03}.db",
                Utc::now().format("%Y%m%dT%H%M%S%.6f"),
                migration.version
            ));
            backup_to(&conn, &backup).map_err(|e| MigrationError::Backup {
                version: migration.version,
                reason: e.to_string(),
            })?;

            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            if let Err(e) = apply_one(&mut conn, migration) {
                tracing::error!(
                    version = migration.version,
                    error = %e,
                    "Migration failed, restoring snapshot"
                );
                drop(conn);
                let restored = match restore_from(&backup, db_path) {
                    Ok(()) => true,
                    Err(restore_err) => {
                        tracing::error!(error = %restore_err, "Snapshot restore failed");
                        false
                    }
                };
                return Err(MigrationError::Failed {
                    version: migration.version,
                    description: migration.description.to_string(),
                    reason: e.to_string(),
                    restored,
                    backup: Some(backup),
                });
            }

            report.applied.push(migration.version);
            report.to_version = migration.version;

            if let Err(e) = cleanup_old_backups(&backup_dir, self.keep_backups) {
                tracing::warn!(error = %e, "Failed to prune old backups");
            }
        }

        if !report.applied.is_empty() {
            tracing::info!(
                from = report.from_version,
                to = report.to_version,
                "Schema migrated"
            );
        }
        Ok(report)
    }
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    (migration.up)(&tx)?;
    tx.execute(
        "INSERT INTO schema_version (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![migration.version, migration.description, Utc::now()],
    )?;
    tx.commit()
}

fn ensure_version_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )
}

fn backups_dir(db_path: &Path) -> PathBuf {
    db_path
        .parent()
        .map(|p| p.join("backups"))
        .unwrap_or_else(|| PathBuf::from("backups"))
}

/// Get current schema version from database
pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Stored version with its application history
pub fn schema_version(conn: &Connection) -> rusqlite::Result<SchemaVersion> {
    let mut stmt = conn.prepare(
        "SELECT version, description, applied_at FROM schema_version ORDER BY version",
    )?;
    let applied = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                description: row.get(1)?,
                applied_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(SchemaVersion {
        version: applied.last().map(|m| m.version).unwrap_or(0),
        applied,
    })
}

// ============================================================================
// MIGRATION BODIES
// ============================================================================

fn migrate_v1_initial_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    doc_type TEXT NOT NULL,
    repository TEXT NOT NULL,
    branch TEXT,
    path TEXT,
    initiative_id TEXT,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT 'null',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_repo_type ON documents(repository, doc_type);
CREATE INDEX IF NOT EXISTS idx_documents_repo_path ON documents(repository, path);
CREATE INDEX IF NOT EXISTS idx_documents_initiative ON documents(initiative_id);

CREATE TABLE IF NOT EXISTS document_embeddings (
    document_id TEXT PRIMARY KEY REFERENCES documents(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    document_id UNINDEXED,
    tokens,
    tokenize='unicode61'
);

CREATE TABLE IF NOT EXISTS file_records (
    repository TEXT NOT NULL,
    path TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    indexed_at TEXT NOT NULL,
    branch TEXT NOT NULL,
    PRIMARY KEY (repository, path)
);

CREATE TABLE IF NOT EXISTS repositories (
    name TEXT PRIMARY KEY,
    root_path TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#,
    )
}

fn migrate_v2_initiatives(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS initiatives (
    id TEXT PRIMARY KEY,
    repository TEXT NOT NULL,
    name TEXT NOT NULL,
    goal TEXT,
    status TEXT NOT NULL DEFAULT 'active',
    focused INTEGER NOT NULL DEFAULT 0,
    status_text TEXT,
    summary TEXT,
    created_at TEXT NOT NULL,
    last_activity_at TEXT NOT NULL,
    completed_at TEXT,
    UNIQUE (repository, name)
);

-- At most one focused initiative per repository
CREATE UNIQUE INDEX IF NOT EXISTS idx_initiatives_one_focus
    ON initiatives(repository) WHERE focused = 1;
"#,
    )
}

fn migrate_v3_normalize_legacy(conn: &Connection) -> rusqlite::Result<()> {
    let renamed = conn.execute(
        "UPDATE documents SET doc_type = 'commit_summary' WHERE doc_type = 'session_summary'",
        [],
    )?;
    let backfilled = conn.execute(
        "UPDATE documents SET metadata = json_set(metadata, '$.status', 'fresh')
         WHERE doc_type = 'insight'
           AND json_valid(metadata)
           AND json_type(metadata) = 'object'
           AND json_extract(metadata, '$.status') IS NULL",
        [],
    )?;
    tracing::debug!(renamed, backfilled, "Normalized legacy documents");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
