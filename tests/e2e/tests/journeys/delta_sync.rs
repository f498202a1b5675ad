//! # Delta Sync Journey
//!
//! Tests incremental ingestion of a real git repository:
//! 1. A first run indexes every file
//! 2. Re-running with nothing changed writes nothing
//! 3. Edits, deletions and renames touch only the affected files
//! 4. Concurrent runs on one repository are refused
//! 5. A torn sync state falls back to a full index

use engram_core::{DocumentType, EngramError, SyncStrategy};
use engram_e2e_tests::{TestDataFactory, TestEngine, TestRepo};

// ============================================================================
// INCREMENTAL RUNS
// ============================================================================

#[tokio::test]
async fn test_first_run_indexes_every_file() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());

    let report = engine.ingest(&repo).await;

    assert_eq!(report.strategy, SyncStrategy::Full);
    assert_eq!(report.branch, "main");
    assert_eq!(report.files_indexed, 3);
    assert!(report.chunks_written >= 3);
    assert!(report.errors.is_empty());
    for path in ["a.py", "b.py", "c.py"] {
        assert!(!engine.code_chunks("acme", path).is_empty(), "{path} not indexed");
    }
}

#[tokio::test]
async fn test_unchanged_repository_is_a_no_op() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;
    let before = engine.count("acme", DocumentType::Code);

    let report = engine.ingest(&repo).await;

    assert_eq!(report.files_indexed, 0);
    assert_eq!(report.files_deleted, 0);
    assert_eq!(report.chunks_written, 0);
    assert_eq!(report.chunks_deleted, 0);
    assert_eq!(engine.count("acme", DocumentType::Code), before);
}

#[tokio::test]
async fn test_deleted_file_is_garbage_collected() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;

    repo.delete("b.py");
    repo.commit_all("drop beta");
    let report = engine.ingest(&repo).await;

    assert_eq!(report.files_deleted, 1);
    assert!(report.chunks_deleted >= 1);
    assert!(engine.code_chunks("acme", "b.py").is_empty());
    assert!(!engine.code_chunks("acme", "a.py").is_empty());
    assert!(!engine.code_chunks("acme", "c.py").is_empty());
}

#[tokio::test]
async fn test_uncommitted_edit_is_reindexed() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;

    repo.write("a.py", "def alpha_renamed():\n    return 10\n");
    let report = engine.ingest(&repo).await;

    assert_eq!(report.strategy, SyncStrategy::Vcs);
    assert_eq!(report.files_indexed, 1);
    let chunks = engine.code_chunks("acme", "a.py");
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| c.content.contains("alpha_renamed")));
    assert!(!engine.code_chunks("acme", "b.py").is_empty());
}

#[tokio::test]
async fn test_reverted_uncommitted_edit_restores_committed_chunks() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;
    let committed = std::fs::read_to_string(repo.path().join("a.py")).unwrap();

    repo.write("a.py", "def alpha_edit():\n    return 9\n");
    engine.ingest(&repo).await;
    repo.write("a.py", &committed);
    let report = engine.ingest(&repo).await;

    assert_eq!(report.strategy, SyncStrategy::Vcs);
    assert_eq!(report.files_indexed, 1);
    let chunks = engine.code_chunks("acme", "a.py");
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|c| !c.content.contains("alpha_edit")));
    assert!(chunks.iter().any(|c| c.content.contains("alpha_helper")));
}

#[tokio::test]
async fn test_deleted_untracked_file_is_garbage_collected() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    repo.write("scratch.py", "def scratch():\n    return 0\n");
    engine.ingest(&repo).await;
    assert!(!engine.code_chunks("acme", "scratch.py").is_empty());

    repo.delete("scratch.py");
    let report = engine.ingest(&repo).await;

    assert_eq!(report.strategy, SyncStrategy::Vcs);
    assert_eq!(report.files_deleted, 1);
    assert!(engine.code_chunks("acme", "scratch.py").is_empty());
    let tracked: usize = ["a.py", "b.py", "c.py"]
        .iter()
        .map(|path| engine.code_chunks("acme", path).len())
        .sum();
    assert_eq!(engine.count("acme", DocumentType::Code), tracked);
}

#[tokio::test]
async fn test_renamed_file_moves_its_chunks() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;

    let content = std::fs::read_to_string(repo.path().join("c.py")).unwrap();
    repo.delete("c.py");
    repo.write("lib/gamma.py", &content);
    repo.commit_all("move gamma");
    let report = engine.ingest(&repo).await;

    assert_eq!(report.files_deleted, 1);
    assert!(engine.code_chunks("acme", "c.py").is_empty());
    assert!(!engine.code_chunks("acme", "lib/gamma.py").is_empty());
}

// ============================================================================
// REDACTION
// ============================================================================

#[tokio::test]
async fn test_secrets_never_reach_the_store() {
    let engine = TestEngine::new_temp();
    let (path, content) = TestDataFactory::leaky_settings();
    let repo = TestRepo::with_files(&[(path, content)]);

    engine.ingest(&repo).await;

    let chunks = engine.code_chunks("acme", path);
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert!(!chunk.content.contains(TestDataFactory::AWS_KEY));
        assert!(!chunk.content.contains(TestDataFactory::GITHUB_TOKEN));
    }
    assert!(chunks.iter().any(|c| c.content.contains("REDACTED")));
}

// ============================================================================
// CONCURRENCY AND RECOVERY
// ============================================================================

#[tokio::test]
async fn test_second_ingest_on_same_repository_is_refused() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    let _held = engine.ctx.ingest.locks().try_acquire("acme").unwrap();

    let err = engine.try_ingest(&repo).await.unwrap_err();

    assert!(matches!(err, EngramError::LockContention(ref name) if name == "acme"));
    assert_eq!(engine.count("acme", DocumentType::Code), 0);
}

#[tokio::test]
async fn test_lock_is_released_after_a_run() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());

    engine.ingest(&repo).await;

    assert!(!engine.ctx.ingest.locks().is_locked("acme"));
    engine.ingest(&repo).await;
}

#[tokio::test]
async fn test_different_repositories_ingest_concurrently() {
    let engine = TestEngine::new_temp();
    let first = TestRepo::named("first");
    let second = TestRepo::named("second");
    for repo in [&first, &second] {
        for (path, content) in TestDataFactory::python_service() {
            repo.write(path, content);
        }
        repo.commit_all("initial");
    }

    let (a, b) = tokio::join!(engine.try_ingest(&first), engine.try_ingest(&second));

    assert_eq!(a.unwrap().files_indexed, 3);
    assert_eq!(b.unwrap().files_indexed, 3);
}

#[tokio::test]
async fn test_corrupt_sync_state_triggers_full_reindex() {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;

    let state_path = engine.ctx.ingest.states().path_for("acme");
    std::fs::write(&state_path, b"{\"repository\": \"acme\", \"fileHa").unwrap();
    let report = engine.ingest(&repo).await;

    assert!(report.state_recovered);
    assert_eq!(report.strategy, SyncStrategy::Full);
    assert_eq!(report.files_indexed, 3);
    assert!(engine.ctx.ingest.states().load("acme").unwrap().is_some());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let mut engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&TestDataFactory::python_service());
    engine.ingest(&repo).await;
    let before = engine.count("acme", DocumentType::Code);

    engine.restart();
    let report = engine.ingest(&repo).await;

    assert_eq!(report.files_indexed, 0);
    assert_eq!(engine.count("acme", DocumentType::Code), before);
}
