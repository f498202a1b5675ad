//! Persisted per-repository sync state
//!
//! One JSON file per repository under the sync directory. Writes go to a
//! temporary file in the same directory which then replaces the old file, so
//! a crash leaves either the previous state or the new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::EngramError;

/// What the last successful sync saw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    pub repository: String,
    pub branch: Option<String>,
    pub last_indexed_commit: Option<String>,
    /// Repository-relative path to content hash
    pub file_hashes: BTreeMap<String, String>,
    /// Indexed paths whose content differed from the last indexed commit
    #[serde(default)]
    pub dirty_paths: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: None,
            last_indexed_commit: None,
            file_hashes: BTreeMap::new(),
            dirty_paths: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Directory of sync state files
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    dir: PathBuf,
}

impl SyncStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// State file for a repository; the name is reduced to a safe file stem
    pub fn path_for(&self, repository: &str) -> PathBuf {
        let stem: String = repository
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.json"))
    }

    /// Load the previous state
    ///
    /// `Ok(None)` when no state was ever written. A torn or undecodable file
    /// yields [`EngramError::SyncStateCorrupt`]; callers treat that as no
    /// prior state.
    pub fn load(&self, repository: &str) -> Result<Option<SyncState>, EngramError> {
        let path = self.path_for(repository);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(EngramError::SyncStateCorrupt {
                    repository: repository.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let state: SyncState =
            serde_json::from_slice(&bytes).map_err(|e| EngramError::SyncStateCorrupt {
                repository: repository.to_string(),
                reason: e.to_string(),
            })?;
        if state.repository != repository {
            return Err(EngramError::SyncStateCorrupt {
                repository: repository.to_string(),
                reason: format!("state file belongs to '{}'", state.repository),
            });
        }
        Ok(Some(state))
    }

    /// Atomically replace the stored state
    pub fn save(&self, state: &SyncState) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.path_for(&state.repository), &json)
    }

    /// Forget a repository's state, forcing the next sync to be full
    pub fn remove(&self, repository: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(repository)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Write `bytes` to a sibling temp file, fsync, then rename over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
