//! Test Engine Manager
//!
//! Provides isolated, fully wired engines for journey tests:
//! - Temporary data directories that are cleaned up on drop
//! - Model-free embedder and reranker so rankings are deterministic
//! - Restarts over the same data directory

use engram_core::{
    lexical_seams, Document, DocumentFilter, DocumentStore, DocumentType, EngineConfig,
    EngineContext, IngestReport, IngestRequest, MigrationRunner, ProviderKind, Result,
    SearchRequest, SearchResponse,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use super::TestRepo;

/// Engine over a throwaway data directory
///
/// # Example
///
/// ```rust,ignore
/// let engine = TestEngine::new_temp();
/// let repo = TestRepo::with_files(&[("a.py", "def a():\n    pass\n")]);
/// engine.ingest(&repo).await;
///
/// let response = engine.search("a", repo.name()).await;
/// ```
pub struct TestEngine {
    /// The wired engine
    pub ctx: Arc<EngineContext>,
    /// Kept alive so the directory outlives the engine
    _temp_dir: Option<TempDir>,
    data_dir: PathBuf,
}

impl TestEngine {
    /// Create an engine whose data directory is deleted on drop
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let data_dir = temp_dir.path().to_path_buf();
        let ctx = Self::open_at(&data_dir, &MigrationRunner::default())
            .expect("Failed to open test engine");

        Self {
            ctx: Arc::new(ctx),
            _temp_dir: Some(temp_dir),
            data_dir,
        }
    }

    /// Open an engine over `data_dir` with a custom migration list
    pub fn open_at(data_dir: &Path, runner: &MigrationRunner) -> Result<EngineContext> {
        let (embedder, reranker) = lexical_seams();
        EngineContext::open_with(Self::config(data_dir), runner, embedder, reranker)
    }

    /// Configuration shared by every test engine
    ///
    /// Summaries come from the extractive provider so no network is needed.
    pub fn config(data_dir: &Path) -> EngineConfig {
        let mut config = EngineConfig::with_data_dir(data_dir);
        config.providers = vec![ProviderKind::Extractive];
        config
    }

    /// Drop the current context and reopen the same data directory
    pub fn restart(&mut self) {
        let ctx = Self::open_at(&self.data_dir, &MigrationRunner::default())
            .expect("Failed to reopen test engine");
        self.ctx = Arc::new(ctx);
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // ========================================================================
    // SHORTCUTS
    // ========================================================================

    /// Ingest `repo` under its own name
    pub async fn ingest(&self, repo: &TestRepo) -> IngestReport {
        self.try_ingest(repo).await.expect("ingest failed")
    }

    pub async fn try_ingest(&self, repo: &TestRepo) -> Result<IngestReport> {
        self.ctx
            .ingest(IngestRequest::new(repo.path()).repository(repo.name()))
            .await
    }

    /// Search with default limits
    pub async fn search(&self, query: &str, repository: &str) -> SearchResponse {
        self.ctx
            .search
            .search(SearchRequest::new(query, repository))
            .await
            .expect("search failed")
    }

    /// Stored code chunks for one path
    pub fn code_chunks(&self, repository: &str, path: &str) -> Vec<Document> {
        let filter = DocumentFilter::repository(repository)
            .with_types(vec![DocumentType::Code])
            .with_path(path);
        self.ctx.storage.find(&filter, 10_000).expect("find failed")
    }

    /// Stored metadata of one document
    pub fn metadata(&self, id: &str) -> serde_json::Value {
        self.ctx
            .storage
            .get(id)
            .expect("get failed")
            .expect("document missing")
            .metadata
    }

    /// Number of stored documents of one type
    pub fn count(&self, repository: &str, doc_type: DocumentType) -> usize {
        let filter = DocumentFilter::repository(repository).with_types(vec![doc_type]);
        self.ctx.storage.count(&filter).expect("count failed")
    }
}
