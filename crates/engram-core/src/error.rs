//! Engine Error Taxonomy
//!
//! Every user-visible failure names the sub-operation that failed and whether
//! any partial work was committed before the failure.

use crate::storage::{MigrationError, StorageError};

/// Top-level engine error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    /// A single file could not be read or parsed; the run continues
    #[error("Ingestion failed for {path}: {reason}")]
    IngestionFile { path: String, reason: String },

    /// The persisted sync state could not be decoded; a full reindex follows
    #[error("Sync state for '{repository}' is corrupt: {reason}")]
    SyncStateCorrupt { repository: String, reason: String },

    /// Documents were written but the new sync state could not be saved
    #[error("Saving sync state for '{repository}' failed (partial work committed: true): {source}")]
    SyncStatePersist {
        repository: String,
        #[source]
        source: std::io::Error,
    },

    /// The document store could not serve a read or accept a write
    #[error("Document store unavailable during {operation} (partial work committed: {partial_commit}): {source}")]
    StoreUnavailable {
        operation: &'static str,
        partial_commit: bool,
        #[source]
        source: StorageError,
    },

    /// A schema migration failed; startup must abort
    #[error("Migration failure: {0}")]
    MigrationFailure(#[from] MigrationError),

    /// validate() was called with an id that does not name an insight
    #[error("Insight not found: {0}")]
    ValidationNotFound(String),

    /// Another ingestion already holds the repository's sync lock
    #[error("Ingestion already running for repository '{0}'")]
    LockContention(String),

    /// No initiative matched the given id or name
    #[error("Initiative not found: {0}")]
    InitiativeNotFound(String),

    /// A state machine rejected the requested transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Caller supplied malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error outside the store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngramError {
    /// Wrap a storage failure with the sub-operation it interrupted
    pub fn store(operation: &'static str, partial_commit: bool, source: StorageError) -> Self {
        EngramError::StoreUnavailable {
            operation,
            partial_commit,
            source,
        }
    }
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngramError>;
