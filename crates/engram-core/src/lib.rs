//! # Engram Core
//!
//! Repository-scoped memory engine for coding assistants:
//!
//! - **Delta Sync**: incremental ingestion driven by version-control diffs or
//!   content hashes, with per-repository single-writer locking and crash-safe
//!   sync state
//! - **Chunking**: syntax-aware code segmentation with secret redaction
//! - **Hybrid Retrieval**: semantic and lexical legs run concurrently, fused
//!   with Reciprocal Rank Fusion, then reranked
//! - **Insight Staleness**: linked-file hashes detect when stored understanding
//!   no longer matches the code
//! - **Initiatives**: a focus/complete state machine that tags and boosts
//!   related memory
//! - **Migrations**: versioned schema upgrades with backup and rollback,
//!   applied before anything else runs
//! - **Capture**: a persisted queue of sessions summarized in the background
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{EngineConfig, EngineContext, IngestRequest, SearchRequest};
//!
//! let ctx = EngineContext::open(EngineConfig::from_env())?;
//! ctx.ingest(IngestRequest::new("/src/acme").repository("acme")).await?;
//!
//! let response = ctx.search.search(SearchRequest::new("retry backoff", "acme")).await?;
//! for hit in response.results {
//!     println!("{} {:.3}", hit.id, hit.scores.final_score);
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): statically linked SQLite with FTS5
//! - `encryption`: SQLCipher, keyed by `ENGRAM_ENCRYPTION_KEY`
//! - `embeddings`: fastembed models for embeddings and cross-encoder reranking

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod capture;
pub mod chunker;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod ingest;
pub mod initiative;
pub mod memory;
pub mod search;
pub mod security;
pub mod storage;
pub mod validation;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Configuration and wiring
pub use config::{EngineConfig, ProviderKind};
pub use context::{lexical_seams, EngineContext};
pub use error::{EngramError, Result};

// Documents and memory writes
pub use memory::{
    CommitSummaryInput, Document, DocumentType, InsightInput, InsightMeta, InsightStatus,
    MemoryWriter, NoteInput, SaveOutcome, ValidationOutcome,
};

// Storage layer
pub use storage::{
    DocumentFilter, DocumentStore, InitiativeStore, MigrationError, MigrationRunner,
    MigrationStatus, SchemaVersion, Storage, StorageError, Store,
};

// Ingestion
pub use ingest::{DeltaSyncEngine, IngestReport, IngestRequest, SyncStrategy};

// Retrieval
pub use search::{FusionEngine, SearchHit, SearchRequest, SearchResponse};

// Staleness and validation
pub use validation::{StalenessReport, ValidationRequest, ValidationResult, Validator};

// Initiatives
pub use initiative::{Initiative, InitiativeManager, InitiativeStatus, Orientation};

// Capture
pub use capture::{CaptureJob, CaptureQueue, CaptureWorker, ProviderChain};

// Embeddings
pub use embeddings::{Embedder, EmbeddingError, HashingEmbedder};

#[cfg(feature = "embeddings")]
pub use embeddings::FastEmbedder;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema version this build migrates to
pub fn schema_target_version() -> u32 {
    MigrationRunner::default().target_version()
}
