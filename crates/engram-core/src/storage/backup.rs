//! Database snapshots
//!
//! Snapshots are standalone SQLite files written with `VACUUM INTO`, so they
//! are consistent even while WAL frames are outstanding.

use rusqlite::Connection;
use std::path::{Path, PathBuf};

use super::sqlite::{Result, StorageError};

/// Number of snapshots retained in a backup directory
pub const BACKUPS_TO_KEEP: usize = 5;

/// Write a consistent snapshot of `conn` to `dest`
pub fn backup_to(conn: &Connection, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        return Err(StorageError::Init(format!(
            "Backup target already exists: {}",
            dest.display()
        )));
    }
    let dest_str = dest.to_string_lossy().to_string();
    conn.execute("VACUUM INTO ?1", [dest_str])?;
    Ok(())
}

/// Replace the database at `db_path` with the snapshot at `backup`
///
/// Every connection to `db_path` must be closed first. Stale WAL and shared
/// memory files are removed so SQLite does not replay them over the snapshot.
pub fn restore_from(backup: &Path, db_path: &Path) -> Result<()> {
    if !backup.exists() {
        return Err(StorageError::NotFound(format!(
            "Backup not found: {}",
            backup.display()
        )));
    }
    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(db_path, suffix);
        if sidecar.exists() {
            std::fs::remove_file(&sidecar)?;
        }
    }
    std::fs::copy(backup, db_path)?;
    Ok(())
}

/// Delete all but the newest `keep` snapshots in `dir`, returning how many were removed
pub fn cleanup_old_backups(dir: &Path, keep: usize) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut backups: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "db"))
        .collect();
    // Names embed a sortable timestamp
    backups.sort();

    let excess = backups.len().saturating_sub(keep);
    for old in backups.iter().take(excess) {
        std::fs::remove_file(old)?;
    }
    Ok(excess)
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
