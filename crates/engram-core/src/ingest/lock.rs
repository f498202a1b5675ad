//! Per-repository single-writer sync lock

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::EngramError;

/// Set of repositories with an ingestion in flight
///
/// Acquisition never waits: a second ingestion of the same repository is
/// rejected with [`EngramError::LockContention`].
#[derive(Debug, Clone, Default)]
pub struct SyncLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl SyncLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the lock for `repository` or fail immediately
    pub fn try_acquire(&self, repository: &str) -> Result<SyncGuard, EngramError> {
        if !self.held().insert(repository.to_string()) {
            tracing::warn!(repository, "Rejected concurrent ingestion");
            return Err(EngramError::LockContention(repository.to_string()));
        }
        Ok(SyncGuard {
            locks: self.clone(),
            repository: repository.to_string(),
        })
    }

    pub fn is_locked(&self, repository: &str) -> bool {
        self.held().contains(repository)
    }
}

/// Releases the repository lock on drop
#[derive(Debug)]
pub struct SyncGuard {
    locks: SyncLocks,
    repository: String,
}

impl SyncGuard {
    pub fn repository(&self) -> &str {
        &self.repository
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.locks.held().remove(&self.repository);
    }
}
