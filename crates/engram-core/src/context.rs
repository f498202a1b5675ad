//! Engine wiring
//!
//! [`EngineContext::open`] is the startup barrier: pending migrations run
//! before any component is built, so no query or ingestion can observe a
//! partially migrated schema.

use std::sync::Arc;

use crate::capture::{CaptureQueue, CaptureWorker, ProviderChain};
use crate::chunker::ChunkerRegistry;
use crate::config::EngineConfig;
use crate::embeddings::{Embedder, HashingEmbedder};
use crate::error::{EngramError, Result};
use crate::ingest::{DeltaSyncEngine, GitVcs, IngestReport, IngestRequest, SyncStateStore, VersionControl};
use crate::initiative::InitiativeManager;
use crate::memory::MemoryWriter;
use crate::search::{FusionConfig, FusionEngine, Reranker, TermOverlapReranker};
use crate::storage::{MigrationRunner, MigrationStatus, SchemaVersion, Storage, StorageError};
use crate::validation::Validator;

/// Every engine component, sharing one store
pub struct EngineContext {
    pub config: EngineConfig,
    pub storage: Arc<Storage>,
    pub ingest: Arc<DeltaSyncEngine>,
    pub initiatives: Arc<InitiativeManager>,
    pub writer: Arc<MemoryWriter>,
    pub validator: Arc<Validator>,
    pub search: Arc<FusionEngine>,
    pub queue: Arc<CaptureQueue>,
    pub providers: Arc<ProviderChain>,
}

impl EngineContext {
    /// Migrate the database and build every component
    ///
    /// A failed migration surfaces as [`EngramError::MigrationFailure`]
    /// after the runner has restored the pre-migration snapshot.
    pub fn open(config: EngineConfig) -> Result<Self> {
        Self::open_with(config, &MigrationRunner::default(), default_embedder(), default_reranker())
    }

    /// Open with explicit migrations and model seams
    pub fn open_with(
        config: EngineConfig,
        runner: &MigrationRunner,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self> {
        let storage = match Storage::with_migrations(Some(config.database_path()), runner) {
            Ok(storage) => Arc::new(storage),
            Err(StorageError::Migration(e)) => {
                tracing::error!("Migration failed, refusing to start: {}", e);
                return Err(EngramError::MigrationFailure(e));
            }
            Err(e) => return Err(EngramError::store("startup.open_store", false, e)),
        };
        let version = storage
            .schema_version()
            .map_err(|e| EngramError::store("startup.schema_version", false, e))?;
        tracing::info!(
            path = %storage.path().display(),
            schema_version = version.version,
            target = runner.target_version(),
            "Document store ready"
        );

        let vcs: Arc<dyn VersionControl> = Arc::new(GitVcs);
        let chunker = Arc::new(ChunkerRegistry::with_defaults());

        let ingest = Arc::new(
            DeltaSyncEngine::new(
                storage.clone(),
                embedder.clone(),
                chunker,
                vcs.clone(),
                SyncStateStore::new(config.sync_dir()),
            )
            .with_global_ignore(config.global_ignore_path()),
        );
        let initiatives = Arc::new(
            InitiativeManager::new(storage.clone(), embedder.clone())
                .with_stale_days(config.initiative_stale_days),
        );
        let writer = Arc::new(MemoryWriter::new(
            storage.clone(),
            embedder.clone(),
            initiatives.clone(),
            vcs.clone(),
        ));
        let validator = Arc::new(
            Validator::new(storage.clone(), writer.clone()).with_staleness_days(config.staleness_days),
        );
        let search = Arc::new(FusionEngine::new(
            storage.clone(),
            embedder,
            reranker,
            vcs,
            FusionConfig::from(&config),
        ));
        let queue = Arc::new(CaptureQueue::new(config.queue_path()));
        let providers = Arc::new(ProviderChain::from_config(&config));
        tracing::debug!(providers = ?providers.names(), "Summarization chain configured");

        Ok(Self {
            config,
            storage,
            ingest,
            initiatives,
            writer,
            validator,
            search,
            queue,
            providers,
        })
    }

    /// Worker draining the capture queue into commit summaries
    pub fn capture_worker(&self) -> CaptureWorker {
        CaptureWorker::new(
            self.queue.clone(),
            self.providers.clone(),
            self.writer.clone(),
            self.config.queue_interval,
        )
    }

    /// Run an ingestion off the async executor
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let engine = self.ingest.clone();
        tokio::task::spawn_blocking(move || engine.ingest(&request))
            .await
            .map_err(|e| EngramError::Io(std::io::Error::other(format!("ingest task failed: {e}"))))?
    }

    /// Schema state against the migrations this build ships
    pub fn migration_status(&self) -> Result<MigrationStatus> {
        self.storage
            .migration_status(&MigrationRunner::default())
            .map_err(|e| EngramError::store("migration_status", false, e))
    }

    pub fn schema_version(&self) -> Result<SchemaVersion> {
        self.storage
            .schema_version()
            .map_err(|e| EngramError::store("schema_version", false, e))
    }
}

#[cfg(feature = "embeddings")]
fn default_embedder() -> Arc<dyn Embedder> {
    Arc::new(crate::embeddings::FastEmbedder::new())
}

#[cfg(not(feature = "embeddings"))]
fn default_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashingEmbedder::default())
}

#[cfg(feature = "embeddings")]
fn default_reranker() -> Arc<dyn Reranker> {
    match crate::search::CrossEncoderReranker::try_new() {
        Ok(reranker) => Arc::new(reranker),
        Err(e) => {
            tracing::warn!("Cross-encoder unavailable, using term overlap: {}", e);
            Arc::new(TermOverlapReranker::default())
        }
    }
}

#[cfg(not(feature = "embeddings"))]
fn default_reranker() -> Arc<dyn Reranker> {
    Arc::new(TermOverlapReranker::default())
}

/// Lightweight seams for tests and model-free deployments
pub fn lexical_seams() -> (Arc<dyn Embedder>, Arc<dyn Reranker>) {
    (
        Arc::new(HashingEmbedder::default()),
        Arc::new(TermOverlapReranker::default()),
    )
}
