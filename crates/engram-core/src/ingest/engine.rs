//! Delta-sync engine
//!
//! Keeps a repository's code chunks in lockstep with its working tree:
//! 1. Pick a strategy: full (no usable prior state), version-control delta
//!    (prior commit known), or content-hash delta.
//! 2. Garbage-collect chunks and file records of deleted or renamed-away paths.
//! 3. Re-chunk changed files whose hash differs from the recorded one.
//! 4. Refresh the skeleton document and atomically persist the new state.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use super::ignore::IgnoreRules;
use super::lock::SyncLocks;
use super::skeleton::{build_skeleton, skeleton_document, skeleton_id};
use super::state::{SyncState, SyncStateStore};
use super::vcs::VersionControl;
use super::walker::{
    compile_patterns, content_hash, is_indexable, matches_include, walk_repository,
};
use crate::chunker::ChunkerRegistry;
use crate::embeddings::Embedder;
use crate::error::{EngramError, Result};
use crate::memory::{code_chunk_id, ChunkMeta, Document, DocumentType};
use crate::storage::{DocumentFilter, DocumentStore, FileRecord, Store};

/// Branch recorded when version control cannot tell
pub const UNKNOWN_BRANCH: &str = "unknown";

// ============================================================================
// REQUEST / REPORT
// ============================================================================

/// One ingestion run
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Repository root on disk
    pub path: PathBuf,
    /// Repository name; defaults to the root directory name
    pub repository: Option<String>,
    /// Only changed files matching one of these globs are indexed
    pub include_patterns: Vec<String>,
    /// Merge the global and per-repository ignore files into the defaults
    pub use_ignore_files: bool,
    /// Ignore prior state and reindex everything
    pub force_full: bool,
}

impl IngestRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            repository: None,
            include_patterns: Vec::new(),
            use_ignore_files: true,
            force_full: false,
        }
    }

    pub fn repository(mut self, name: impl Into<String>) -> Self {
        self.repository = Some(name.into());
        self
    }

    pub fn include(mut self, patterns: Vec<String>) -> Self {
        self.include_patterns = patterns;
        self
    }

    pub fn force_full(mut self, force: bool) -> Self {
        self.force_full = force;
        self
    }
}

/// How the changed-file set was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    Full,
    Vcs,
    Hash,
}

/// A file that was skipped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub path: String,
    pub reason: String,
}

/// Outcome of an ingestion run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub repository: String,
    pub branch: String,
    pub strategy: SyncStrategy,
    /// Candidate files examined
    pub files_scanned: usize,
    pub files_indexed: usize,
    /// Candidates whose hash matched the recorded one
    pub files_unchanged: usize,
    /// Candidates that could not be read
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub chunks_written: usize,
    /// Chunks removed by garbage collection
    pub chunks_deleted: usize,
    pub errors: Vec<FileFailure>,
    /// Prior state was unreadable and the run fell back to a full index
    pub state_recovered: bool,
    pub duration_ms: u64,
}

impl IngestReport {
    fn new(repository: &str, branch: &str, strategy: SyncStrategy) -> Self {
        Self {
            repository: repository.to_string(),
            branch: branch.to_string(),
            strategy,
            files_scanned: 0,
            files_indexed: 0,
            files_unchanged: 0,
            files_skipped: 0,
            files_deleted: 0,
            chunks_written: 0,
            chunks_deleted: 0,
            errors: Vec::new(),
            state_recovered: false,
            duration_ms: 0,
        }
    }

    /// Whether any store mutation already happened
    pub fn has_committed(&self) -> bool {
        self.files_indexed > 0 || self.files_deleted > 0 || self.chunks_deleted > 0
    }
}

struct SyncPlan {
    strategy: SyncStrategy,
    changed: Vec<String>,
    deleted: Vec<String>,
}

enum FileOutcome {
    Unchanged,
    Indexed { hash: String, chunks: usize },
}

// ============================================================================
// ENGINE
// ============================================================================

/// Incremental repository indexer
pub struct DeltaSyncEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<ChunkerRegistry>,
    vcs: Arc<dyn VersionControl>,
    states: SyncStateStore,
    locks: SyncLocks,
    global_ignore: Option<PathBuf>,
}

impl DeltaSyncEngine {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        chunker: Arc<ChunkerRegistry>,
        vcs: Arc<dyn VersionControl>,
        states: SyncStateStore,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
            vcs,
            states,
            locks: SyncLocks::new(),
            global_ignore: None,
        }
    }

    /// Global ignore file merged into every repository's rules
    pub fn with_global_ignore(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_ignore = Some(path.into());
        self
    }

    pub fn locks(&self) -> &SyncLocks {
        &self.locks
    }

    pub fn states(&self) -> &SyncStateStore {
        &self.states
    }

    /// Bring the index for one repository up to date
    ///
    /// Fails with [`EngramError::LockContention`] if the repository is
    /// already being ingested. Per-file failures are recorded in the report.
    pub fn ingest(&self, request: &IngestRequest) -> Result<IngestReport> {
        let started = Instant::now();
        let root = request.path.canonicalize().map_err(|e| {
            EngramError::InvalidInput(format!("cannot open {}: {e}", request.path.display()))
        })?;
        if !root.is_dir() {
            return Err(EngramError::InvalidInput(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        let repository = match &request.repository {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| EngramError::InvalidInput("repository name required".into()))?,
        };
        let include = compile_patterns(&request.include_patterns)
            .map_err(|e| EngramError::InvalidInput(format!("bad include pattern: {e}")))?;

        let _guard = self.locks.try_acquire(&repository)?;

        let branch = self.vcs.current_branch(&root).unwrap_or_else(|e| {
            tracing::debug!(repository = %repository, error = %e, "No branch information");
            UNKNOWN_BRANCH.to_string()
        });
        let head = self.vcs.head_commit(&root).ok().flatten();

        self.store
            .register_repository(&repository, &root)
            .map_err(|e| EngramError::store("ingest.register_repository", false, e))?;

        let rules = IgnoreRules::load(&root, self.global_ignore.as_deref(), request.use_ignore_files);
        let walked = walk_repository(&root, &rules)?;

        let mut state_recovered = false;
        let prior = if request.force_full {
            None
        } else {
            match self.states.load(&repository) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(error = %e, "Falling back to full reindex");
                    state_recovered = true;
                    None
                }
            }
        };

        let walked_paths: Vec<String> = walked.iter().map(|f| f.relative.clone()).collect();
        let mut plan = self.plan(&root, &repository, &rules, &walked_paths, prior.as_ref(), head.as_deref())?;
        plan.changed.retain(|p| matches_include(p, &include));

        tracing::info!(
            repository = %repository,
            branch = %branch,
            strategy = ?plan.strategy,
            changed = plan.changed.len(),
            deleted = plan.deleted.len(),
            "Starting ingestion"
        );

        let mut report = IngestReport::new(&repository, &branch, plan.strategy);
        report.state_recovered = state_recovered;
        report.files_scanned = plan.changed.len();

        let prior_commit = prior.as_ref().and_then(|s| s.last_indexed_commit.clone());
        let (mut hashes, prior_dirty) = prior
            .map(|s| (s.file_hashes, s.dirty_paths))
            .unwrap_or_default();

        self.collect_garbage(&repository, &plan.deleted, &mut hashes, &mut report)?;

        for rel in &plan.changed {
            match self.index_file(&root, &repository, &branch, rel, hashes.get(rel)) {
                Ok(FileOutcome::Unchanged) => report.files_unchanged += 1,
                Ok(FileOutcome::Indexed { hash, chunks }) => {
                    report.files_indexed += 1;
                    report.chunks_written += chunks;
                    hashes.insert(rel.clone(), hash);
                }
                Err(EngramError::IngestionFile { path, reason }) => {
                    tracing::warn!(path = %path, reason = %reason, "Skipping file");
                    report.files_skipped += 1;
                    report.errors.push(FileFailure { path, reason });
                }
                Err(EngramError::StoreUnavailable {
                    operation,
                    partial_commit,
                    source,
                }) => {
                    return Err(EngramError::store(
                        operation,
                        partial_commit || report.has_committed(),
                        source,
                    ));
                }
                Err(other) => return Err(other),
            }
        }

        self.refresh_skeleton(&repository, &branch, &walked_paths, &report)?;

        // Selective runs must not move the commit past files they skipped
        let (last_indexed_commit, dirty_paths) = if include.is_empty() {
            self.worktree_baseline(&root, &repository, head, &hashes)
        } else {
            let mut dirty = prior_dirty;
            dirty.extend(plan.changed.iter().cloned());
            dirty.retain(|p| hashes.contains_key(p));
            (prior_commit, dirty)
        };
        let state = SyncState {
            repository: repository.clone(),
            branch: Some(branch.clone()),
            last_indexed_commit,
            file_hashes: hashes,
            dirty_paths,
            updated_at: Utc::now(),
        };
        self.states
            .save(&state)
            .map_err(|source| EngramError::SyncStatePersist {
                repository: repository.clone(),
                source,
            })?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            repository = %repository,
            indexed = report.files_indexed,
            unchanged = report.files_unchanged,
            deleted = report.files_deleted,
            skipped = report.files_skipped,
            chunks = report.chunks_written,
            duration_ms = report.duration_ms,
            "Ingestion complete"
        );
        Ok(report)
    }

    fn plan(
        &self,
        root: &Path,
        repository: &str,
        rules: &IgnoreRules,
        walked: &[String],
        prior: Option<&SyncState>,
        head: Option<&str>,
    ) -> Result<SyncPlan> {
        let Some(state) = prior else {
            // Records whose file vanished while no state was available
            let deleted = self
                .store
                .file_records(repository)
                .map_err(|e| EngramError::store("ingest.load_file_records", false, e))?
                .into_iter()
                .filter(|r| !root.join(&r.path).exists())
                .map(|r| r.path)
                .collect();
            return Ok(SyncPlan {
                strategy: SyncStrategy::Full,
                changed: walked.to_vec(),
                deleted,
            });
        };

        if let (Some(since), Some(_)) = (state.last_indexed_commit.as_deref(), head) {
            match self.vcs.diff(root, since) {
                Ok(diff) => {
                    let mut changed = BTreeSet::new();
                    let mut deleted = BTreeSet::new();
                    for path in diff.added.into_iter().chain(diff.modified) {
                        changed.insert(path);
                    }
                    for (old, new) in diff.renamed {
                        deleted.insert(old);
                        changed.insert(new);
                    }
                    deleted.extend(diff.deleted);

                    // The diff only sees what differs from the commit; paths
                    // indexed from uncommitted content may have since been
                    // reverted or removed without appearing in it.
                    let present: BTreeSet<&str> = walked.iter().map(String::as_str).collect();
                    for path in state.file_hashes.keys() {
                        if !present.contains(path.as_str()) && !root.join(path).exists() {
                            deleted.insert(path.clone());
                        }
                    }
                    for path in &state.dirty_paths {
                        if present.contains(path.as_str()) {
                            changed.insert(path.clone());
                        }
                    }
                    changed.retain(|p| is_indexable(root, p, rules));

                    let mut known_deleted = Vec::new();
                    for path in deleted {
                        if self.is_known(repository, state, &path)? {
                            known_deleted.push(path);
                        }
                    }
                    return Ok(SyncPlan {
                        strategy: SyncStrategy::Vcs,
                        changed: changed.into_iter().collect(),
                        deleted: known_deleted,
                    });
                }
                Err(e) => {
                    tracing::warn!(repository, error = %e, "VCS diff failed, using content hashes");
                }
            }
        }

        let present: BTreeSet<&str> = walked.iter().map(String::as_str).collect();
        let deleted = state
            .file_hashes
            .keys()
            .filter(|p| !present.contains(p.as_str()) && !root.join(p.as_str()).exists())
            .cloned()
            .collect();
        Ok(SyncPlan {
            strategy: SyncStrategy::Hash,
            changed: walked.to_vec(),
            deleted,
        })
    }

    /// Commit to diff from next time, and the indexed paths that differ from it
    fn worktree_baseline(
        &self,
        root: &Path,
        repository: &str,
        head: Option<String>,
        hashes: &BTreeMap<String, String>,
    ) -> (Option<String>, BTreeSet<String>) {
        let Some(head) = head else {
            return (None, BTreeSet::new());
        };
        match self.vcs.diff(root, &head) {
            Ok(diff) => {
                let dirty = diff
                    .added
                    .into_iter()
                    .chain(diff.modified)
                    .chain(diff.renamed.into_iter().map(|(_, new)| new))
                    .filter(|p| hashes.contains_key(p))
                    .collect();
                (Some(head), dirty)
            }
            Err(e) => {
                // Without a dirty set the next run must compare hashes
                tracing::warn!(repository, error = %e, "Working tree diff failed");
                (None, BTreeSet::new())
            }
        }
    }

    fn is_known(&self, repository: &str, state: &SyncState, path: &str) -> Result<bool> {
        if state.file_hashes.contains_key(path) {
            return Ok(true);
        }
        Ok(self
            .store
            .file_record(repository, path)
            .map_err(|e| EngramError::store("ingest.load_file_records", false, e))?
            .is_some())
    }

    fn collect_garbage(
        &self,
        repository: &str,
        deleted: &[String],
        hashes: &mut BTreeMap<String, String>,
        report: &mut IngestReport,
    ) -> Result<()> {
        for path in deleted {
            let filter = DocumentFilter::repository(repository)
                .with_types(vec![DocumentType::Code])
                .with_path(path.clone());
            let removed = self
                .store
                .delete_where(&filter)
                .map_err(|e| EngramError::store("ingest.garbage_collect", report.has_committed(), e))?;
            self.store
                .delete_file_record(repository, path)
                .map_err(|e| EngramError::store("ingest.garbage_collect", true, e))?;
            hashes.remove(path);
            report.files_deleted += 1;
            report.chunks_deleted += removed;
            tracing::debug!(path = %path, chunks = removed, "Garbage collected");
        }
        Ok(())
    }

    fn index_file(
        &self,
        root: &Path,
        repository: &str,
        branch: &str,
        rel: &str,
        previous_hash: Option<&String>,
    ) -> Result<FileOutcome> {
        let file_error = |reason: String| EngramError::IngestionFile {
            path: rel.to_string(),
            reason,
        };
        let bytes = fs::read(root.join(rel)).map_err(|e| file_error(e.to_string()))?;
        let hash = content_hash(&bytes);
        if previous_hash == Some(&hash) {
            return Ok(FileOutcome::Unchanged);
        }
        let content =
            String::from_utf8(bytes).map_err(|_| file_error("not valid UTF-8".to_string()))?;

        let extension = Path::new(rel)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let language = self.chunker.language_for(extension);

        let stale = DocumentFilter::repository(repository)
            .with_types(vec![DocumentType::Code])
            .with_path(rel.to_string());
        self.store
            .delete_where(&stale)
            .map_err(|e| EngramError::store("ingest.replace_chunks", false, e))?;

        let mut written = 0;
        for (index, chunk) in self.chunker.chunk(&content, extension).enumerate() {
            let mut doc = Document::new(
                code_chunk_id(repository, rel, index),
                DocumentType::Code,
                repository,
                chunk.text,
            );
            doc.branch = Some(branch.to_string());
            doc.path = Some(rel.to_string());
            doc.tags = vec![language.clone()];
            let meta = ChunkMeta {
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                function_name: chunk.function_name,
                class_name: chunk.class_name,
                scope: chunk.scope,
                language: language.clone(),
                chunk_index: index,
            };
            doc.metadata = serde_json::to_value(&meta).unwrap_or_default();

            let embed_text = match &meta.scope {
                Some(scope) => format!("{rel} {scope}\n{}", doc.content),
                None => format!("{rel}\n{}", doc.content),
            };
            let embedding = match self.embedder.embed(&embed_text) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!(path = rel, error = %e, "Embedding failed, chunk is lexical-only");
                    None
                }
            };
            self.store
                .upsert(&doc, embedding.as_deref())
                .map_err(|e| EngramError::store("ingest.upsert_chunks", true, e))?;
            written += 1;
        }

        self.store
            .upsert_file_record(&FileRecord {
                repository: repository.to_string(),
                path: rel.to_string(),
                content_hash: hash.clone(),
                indexed_at: Utc::now(),
                branch: branch.to_string(),
            })
            .map_err(|e| EngramError::store("ingest.file_record", true, e))?;

        Ok(FileOutcome::Indexed {
            hash,
            chunks: written,
        })
    }

    fn refresh_skeleton(
        &self,
        repository: &str,
        branch: &str,
        paths: &[String],
        report: &IngestReport,
    ) -> Result<()> {
        let id = skeleton_id(repository, branch);
        let exists = self
            .store
            .get(&id)
            .map_err(|e| EngramError::store("ingest.skeleton", report.has_committed(), e))?
            .is_some();
        if exists && report.files_indexed == 0 && report.files_deleted == 0 {
            return Ok(());
        }
        let skeleton = build_skeleton(repository, paths.iter().map(String::as_str));
        let doc = skeleton_document(repository, branch, &skeleton);
        let embedding = self.embedder.embed(&doc.content).ok();
        self.store
            .upsert(&doc, embedding.as_deref())
            .map_err(|e| EngramError::store("ingest.skeleton", report.has_committed(), e))?;
        tracing::debug!(
            files = skeleton.total_files,
            dirs = skeleton.total_dirs,
            "Skeleton refreshed"
        );
        Ok(())
    }
}

// ============================================================================
// REPOSITORY LOCATION
// ============================================================================

/// Where a registered repository lives and what is checked out there
#[derive(Debug, Clone, PartialEq)]
pub struct RepoLocation {
    /// `None` until the repository has been ingested once
    pub root: Option<PathBuf>,
    pub branch: String,
}

/// Resolve a repository's root from the registry and its current branch
pub fn locate_repository(
    store: &dyn Store,
    vcs: &dyn VersionControl,
    repository: &str,
) -> Result<RepoLocation> {
    let record = store
        .repository(repository)
        .map_err(|e| EngramError::store("repository.lookup", false, e))?;
    let root = record.map(|r| r.root_path);
    let branch = root
        .as_deref()
        .and_then(|root| vcs.current_branch(root).ok())
        .unwrap_or_else(|| UNKNOWN_BRANCH.to_string());
    Ok(RepoLocation { root, branch })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::ingest::vcs::GitVcs;
    use crate::storage::Storage;
    use tempfile::TempDir;

    struct Fixture {
        engine: DeltaSyncEngine,
        store: Arc<Storage>,
        repo: TempDir,
        _data: TempDir,
    }

    fn fixture() -> Fixture {
        let data = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let store = Arc::new(Storage::new(Some(data.path().join("engram.db"))).unwrap());
        let engine = DeltaSyncEngine::new(
            store.clone(),
            Arc::new(HashingEmbedder::default()),
            Arc::new(ChunkerRegistry::with_defaults()),
            Arc::new(GitVcs),
            SyncStateStore::new(data.path().join("sync")),
        );
        Fixture {
            engine,
            store,
            repo,
            _data: data,
        }
    }

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn request(f: &Fixture) -> IngestRequest {
        IngestRequest::new(f.repo.path()).repository("acme")
    }

    fn code_paths(store: &Storage) -> BTreeSet<String> {
        store
            .find(
                &DocumentFilter::repository("acme").with_types(vec![DocumentType::Code]),
                1000,
            )
            .unwrap()
            .into_iter()
            .filter_map(|d| d.path)
            .collect()
    }

    fn seed(f: &Fixture) {
        write(f.repo.path(), "a.py", "def alpha():\n    return 1\n");
        write(f.repo.path(), "b.py", "def beta():\n    return 2\n");
        write(f.repo.path(), "c.py", "def gamma():\n    return 3\n");
    }

    #[test]
    fn test_first_run_is_full_and_rerun_is_noop() {
        let f = fixture();
        seed(&f);
        let first = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(first.strategy, SyncStrategy::Full);
        assert_eq!(first.files_indexed, 3);
        assert!(first.chunks_written >= 3);

        let second = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(second.strategy, SyncStrategy::Hash);
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_deleted, 0);
        assert_eq!(second.files_unchanged, 3);
        assert!(!second.has_committed());
    }

    #[test]
    fn test_deleted_file_is_garbage_collected() {
        let f = fixture();
        seed(&f);
        f.engine.ingest(&request(&f)).unwrap();
        fs::remove_file(f.repo.path().join("b.py")).unwrap();

        let report = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(report.files_deleted, 1);
        assert!(report.chunks_deleted >= 1);
        assert_eq!(
            code_paths(&f.store),
            BTreeSet::from(["a.py".to_string(), "c.py".to_string()])
        );
        assert!(f.store.file_record("acme", "b.py").unwrap().is_none());
    }

    #[test]
    fn test_modified_file_replaces_its_chunks() {
        let f = fixture();
        seed(&f);
        f.engine.ingest(&request(&f)).unwrap();
        write(f.repo.path(), "a.py", "def alpha_renamed():\n    return 10\n");

        let report = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_unchanged, 2);

        let chunks = f
            .store
            .find(&DocumentFilter::repository("acme").with_path("a.py"), 100)
            .unwrap();
        assert!(chunks.iter().all(|c| c.content.contains("alpha_renamed")));
        let record = f.store.file_record("acme", "a.py").unwrap().unwrap();
        assert_eq!(record.content_hash, content_hash(b"def alpha_renamed():\n    return 10\n"));
    }

    #[test]
    fn test_corrupt_state_forces_full_reindex() {
        let f = fixture();
        seed(&f);
        f.engine.ingest(&request(&f)).unwrap();
        fs::write(f.engine.states().path_for("acme"), b"{ torn").unwrap();

        let report = f.engine.ingest(&request(&f)).unwrap();
        assert!(report.state_recovered);
        assert_eq!(report.strategy, SyncStrategy::Full);
        assert_eq!(report.files_indexed, 3);
        // State is healthy again
        assert!(f.engine.states().load("acme").unwrap().is_some());
    }

    #[test]
    fn test_include_patterns_restrict_changed_set() {
        let f = fixture();
        write(f.repo.path(), "src/app.py", "def app():\n    pass\n");
        write(f.repo.path(), "tests/test_app.py", "def test_app():\n    pass\n");

        let report = f
            .engine
            .ingest(&request(&f).include(vec!["src/**".to_string()]))
            .unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(code_paths(&f.store), BTreeSet::from(["src/app.py".to_string()]));

        // A later unrestricted run picks up the rest
        let report = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(report.files_indexed, 1);
        assert_eq!(report.files_unchanged, 1);
    }

    #[test]
    fn test_unreadable_file_is_skipped_not_fatal() {
        let f = fixture();
        seed(&f);
        fs::write(f.repo.path().join("bad.py"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let report = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(report.files_indexed, 3);
        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.errors[0].path, "bad.py");
    }

    #[test]
    fn test_concurrent_ingest_is_rejected() {
        let f = fixture();
        seed(&f);
        let _held = f.engine.locks().try_acquire("acme").unwrap();
        assert!(matches!(
            f.engine.ingest(&request(&f)),
            Err(EngramError::LockContention(_))
        ));
    }

    #[test]
    fn test_skeleton_written_once() {
        let f = fixture();
        seed(&f);
        f.engine.ingest(&request(&f)).unwrap();
        let skeleton = f.store.get("skeleton:acme:unknown").unwrap().unwrap();
        assert!(skeleton.content.contains("b.py"));
        assert_eq!(skeleton.metadata["totalFiles"], 3);
    }

    #[test]
    fn test_force_full_reindexes_everything() {
        let f = fixture();
        seed(&f);
        f.engine.ingest(&request(&f)).unwrap();
        let report = f.engine.ingest(&request(&f).force_full(true)).unwrap();
        assert_eq!(report.strategy, SyncStrategy::Full);
        assert_eq!(report.files_indexed, 3);
    }

    fn commit_all(repo: &git2::Repository, message: &str) {
        use git2::{IndexAddOption, Signature};

        let mut index = repo.index().unwrap();
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents).unwrap();
    }

    fn chunk_contents(store: &Storage, path: &str) -> Vec<String> {
        store
            .find(&DocumentFilter::repository("acme").with_path(path), 100)
            .unwrap()
            .into_iter()
            .map(|d| d.content)
            .collect()
    }

    #[test]
    fn test_git_rename_moves_chunks() {
        let f = fixture();
        let repo = git2::Repository::init(f.repo.path()).unwrap();

        let body = "def handler(event):\n    return event\n".repeat(10);
        write(f.repo.path(), "old_name.py", &body);
        write(f.repo.path(), "keep.py", "def keep():\n    pass\n");
        commit_all(&repo, "init");
        let first = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(first.strategy, SyncStrategy::Full);

        fs::rename(f.repo.path().join("old_name.py"), f.repo.path().join("new_name.py")).unwrap();
        commit_all(&repo, "rename");
        let report = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(report.strategy, SyncStrategy::Vcs);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(report.files_indexed, 1);
        assert_eq!(
            code_paths(&f.store),
            BTreeSet::from(["keep.py".to_string(), "new_name.py".to_string()])
        );
    }

    #[test]
    fn test_git_untracked_file_deleted_after_indexing() {
        let f = fixture();
        let repo = git2::Repository::init(f.repo.path()).unwrap();
        write(f.repo.path(), "a.py", "def alpha():\n    return 1\n");
        commit_all(&repo, "init");
        write(f.repo.path(), "scratch.py", "def scratch():\n    return 0\n");

        let first = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(first.files_indexed, 2);

        fs::remove_file(f.repo.path().join("scratch.py")).unwrap();
        let report = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(report.strategy, SyncStrategy::Vcs);
        assert_eq!(report.files_deleted, 1);
        assert_eq!(code_paths(&f.store), BTreeSet::from(["a.py".to_string()]));
        assert!(f.store.file_record("acme", "scratch.py").unwrap().is_none());
    }

    #[test]
    fn test_git_reverted_edit_is_reindexed() {
        let f = fixture();
        let repo = git2::Repository::init(f.repo.path()).unwrap();
        let original = "def alpha():\n    return 1\n";
        write(f.repo.path(), "a.py", original);
        commit_all(&repo, "init");
        f.engine.ingest(&request(&f)).unwrap();

        write(f.repo.path(), "a.py", "def alpha_edit():\n    return 9\n");
        let edited = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(edited.strategy, SyncStrategy::Vcs);
        assert_eq!(edited.files_indexed, 1);
        assert!(f.engine.states().load("acme").unwrap().unwrap().dirty_paths.contains("a.py"));

        write(f.repo.path(), "a.py", original);
        let reverted = f.engine.ingest(&request(&f)).unwrap();
        assert_eq!(reverted.strategy, SyncStrategy::Vcs);
        assert_eq!(reverted.files_indexed, 1);
        let contents = chunk_contents(&f.store, "a.py");
        assert!(!contents.is_empty());
        assert!(contents.iter().all(|c| c.contains("def alpha()") && !c.contains("alpha_edit")));
        let record = f.store.file_record("acme", "a.py").unwrap().unwrap();
        assert_eq!(record.content_hash, content_hash(original.as_bytes()));

        // Clean again, nothing left to recheck
        let state = f.engine.states().load("acme").unwrap().unwrap();
        assert!(state.dirty_paths.is_empty());
        let rerun = f.engine.ingest(&request(&f)).unwrap();
        assert!(!rerun.has_committed());
    }

    #[test]
    fn test_locate_repository() {
        let f = fixture();
        let unknown = locate_repository(f.store.as_ref(), &GitVcs, "acme").unwrap();
        assert_eq!(unknown, RepoLocation { root: None, branch: UNKNOWN_BRANCH.to_string() });

        seed(&f);
        f.engine.ingest(&request(&f)).unwrap();
        let located = locate_repository(f.store.as_ref(), &GitVcs, "acme").unwrap();
        assert_eq!(located.root, Some(f.repo.path().canonicalize().unwrap()));
        // Not a git repository
        assert_eq!(located.branch, UNKNOWN_BRANCH);
    }
}
