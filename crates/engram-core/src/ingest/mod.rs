//! Ingestion Module
//!
//! Delta-sync of repositories into the document store:
//! - Ignore rules (defaults, global and per-repository ignore files)
//! - Filesystem walk with size, binary and hidden-file filters
//! - Version-control diffs with rename detection
//! - Crash-safe per-repository sync state
//! - Per-repository single-writer lock

mod engine;
mod ignore;
mod lock;
mod skeleton;
mod state;
mod vcs;
mod walker;

pub use engine::{
    locate_repository, DeltaSyncEngine, FileFailure, IngestReport, IngestRequest, RepoLocation,
    SyncStrategy, UNKNOWN_BRANCH,
};
pub use ignore::{
    is_binary_extension, parse_ignore_lines, IgnoreRules, BINARY_EXTENSIONS,
    DEFAULT_IGNORE_PATTERNS, IGNORE_FILE_NAME,
};
pub use lock::{SyncGuard, SyncLocks};
pub use skeleton::{build_skeleton, skeleton_id, Skeleton};
pub use state::{SyncState, SyncStateStore};
pub use vcs::{GitVcs, VcsDiff, VcsError, VersionControl};
pub use walker::{content_hash, hash_file, walk_repository, WalkedFile, MAX_FILE_SIZE};

pub(crate) use state::write_atomic;
