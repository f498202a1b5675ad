//! # Capture Queue Journey
//!
//! Tests deferred session capture:
//! 1. Sessions are queued on disk and survive restarts
//! 2. The worker summarizes them into commit summaries
//! 3. Jobs stay queued while no provider can summarize
//! 4. Reprocessing a session overwrites rather than duplicates
//! 5. A session requeued mid-drain is not lost

use engram_core::capture::{CaptureWorker, ProviderChain};
use engram_core::{DocumentStore, DocumentType};
use engram_e2e_tests::{TestDataFactory, TestEngine, TestRepo};
use std::sync::Arc;
use std::time::Duration;

async fn setup() -> (TestEngine, TestRepo) {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&[TestDataFactory::rust_retry()]);
    engine.ingest(&repo).await;
    (engine, repo)
}

fn offline_worker(engine: &TestEngine) -> CaptureWorker {
    CaptureWorker::new(
        engine.ctx.queue.clone(),
        Arc::new(ProviderChain::new(Vec::new())),
        engine.ctx.writer.clone(),
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn test_queued_session_becomes_commit_summary() {
    let (engine, _repo) = setup().await;
    engine
        .ctx
        .queue
        .enqueue(TestDataFactory::session("sess-1", "acme", &["src/retry.rs"]))
        .unwrap();

    let report = engine.ctx.capture_worker().drain().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.remaining, 0);
    let doc = engine.ctx.storage.get("commit_summary:sess-1").unwrap().unwrap();
    assert_eq!(doc.doc_type, DocumentType::CommitSummary);
    assert!(doc.content.contains("retry_delay"));
    assert!(doc.content.contains("src/retry.rs"));
    assert_eq!(doc.branch.as_deref(), Some("main"));
}

#[tokio::test]
async fn test_captured_summary_is_searchable() {
    let (engine, _repo) = setup().await;
    engine
        .ctx
        .queue
        .enqueue(TestDataFactory::session("sess-1", "acme", &["src/retry.rs"]))
        .unwrap();
    engine.ctx.capture_worker().drain().await.unwrap();

    let response = engine.search("backoff overflow", "acme").await;

    assert!(response.results.iter().any(|h| h.id == "commit_summary:sess-1"));
}

#[tokio::test]
async fn test_jobs_wait_for_a_provider() {
    let (engine, _repo) = setup().await;
    engine
        .ctx
        .queue
        .enqueue(TestDataFactory::session("sess-1", "acme", &[]))
        .unwrap();

    let report = offline_worker(&engine).drain().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 1);
    assert!(engine.ctx.storage.get("commit_summary:sess-1").unwrap().is_none());

    let report = engine.ctx.capture_worker().drain().await.unwrap();
    assert_eq!(report.processed, 1);
    assert!(engine.ctx.queue.is_empty().unwrap());
}

#[tokio::test]
async fn test_queue_survives_restart() {
    let (mut engine, _repo) = setup().await;
    engine
        .ctx
        .queue
        .enqueue(TestDataFactory::session("sess-1", "acme", &[]))
        .unwrap();

    engine.restart();

    assert_eq!(engine.ctx.queue.len().unwrap(), 1);
    let report = engine.ctx.capture_worker().drain().await.unwrap();
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn test_reprocessing_a_session_does_not_duplicate() {
    let (engine, _repo) = setup().await;
    let worker = engine.ctx.capture_worker();
    for _ in 0..2 {
        engine
            .ctx
            .queue
            .enqueue(TestDataFactory::session("sess-1", "acme", &[]))
            .unwrap();
        worker.drain().await.unwrap();
    }

    assert_eq!(engine.count("acme", DocumentType::CommitSummary), 1);
}

#[tokio::test]
async fn test_session_requeued_after_snapshot_survives_removal() {
    let (engine, _repo) = setup().await;
    let queue = &engine.ctx.queue;
    queue
        .enqueue(TestDataFactory::session("sess-1", "acme", &["src/retry.rs"]))
        .unwrap();
    let snapshot = queue.pending().unwrap();

    let mut longer = TestDataFactory::session("sess-1", "acme", &["src/retry.rs", "src/lib.rs"]);
    longer.queued_at = snapshot[0].queued_at + chrono::Duration::seconds(1);
    queue.enqueue(longer).unwrap();
    queue.remove(&snapshot).unwrap();

    let left = queue.pending().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].files_edited.len(), 2);

    engine.ctx.capture_worker().drain().await.unwrap();
    let doc = engine.ctx.storage.get("commit_summary:sess-1").unwrap().unwrap();
    assert!(doc.content.contains("src/lib.rs"));
}

#[tokio::test]
async fn test_capture_is_tagged_with_focused_initiative() {
    let (engine, _repo) = setup().await;
    let initiative = engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();
    engine
        .ctx
        .queue
        .enqueue(TestDataFactory::session("sess-1", "acme", &["src/retry.rs"]))
        .unwrap();

    engine.ctx.capture_worker().drain().await.unwrap();

    let doc = engine.ctx.storage.get("commit_summary:sess-1").unwrap().unwrap();
    assert_eq!(doc.initiative_id.as_deref(), Some(initiative.id.as_str()));
}

#[tokio::test]
async fn test_background_worker_drains_on_wake() {
    let (engine, _repo) = setup().await;
    let worker = engine.ctx.capture_worker();
    let waker = worker.waker();
    let (stop, stopped) = tokio::sync::watch::channel(false);
    let handle = worker.spawn(stopped);

    engine
        .ctx
        .queue
        .enqueue(TestDataFactory::session("sess-7", "acme", &[]))
        .unwrap();
    waker.notify_one();

    let mut saved = false;
    for _ in 0..100 {
        if engine.ctx.storage.get("commit_summary:sess-7").unwrap().is_some() {
            saved = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(saved);

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
