//! # Initiative Workflow Journey
//!
//! Tests multi-session work tracking end to end:
//! 1. Creating an initiative focuses it
//! 2. Memory saved while focused is tagged and boosted
//! 3. Completion language prompts for completion; nothing auto-completes
//! 4. A quiet initiative triggers an orientation prompt

use chrono::{Duration, Utc};
use engram_core::{
    CommitSummaryInput, DocumentStore, DocumentType, EngramError, InitiativeStatus,
    InitiativeStore, SearchRequest,
};
use engram_e2e_tests::{TestDataFactory, TestEngine, TestRepo};

async fn setup() -> (TestEngine, TestRepo) {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&[TestDataFactory::rust_retry()]);
    engine.ingest(&repo).await;
    (engine, repo)
}

#[tokio::test]
async fn test_focused_initiative_tags_new_notes() {
    let (engine, _repo) = setup().await;
    let initiative = engine
        .ctx
        .initiatives
        .create("acme", "Retry overhaul", Some("Bound every backoff".into()))
        .unwrap();
    assert!(initiative.focused);

    let saved = engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "Backoff caps at 6.4 seconds"))
        .unwrap();

    assert_eq!(saved.initiative_id.as_deref(), Some(initiative.id.as_str()));
    assert_eq!(saved.initiative_name.as_deref(), Some("Retry overhaul"));
    let doc = engine.ctx.storage.get(&saved.id).unwrap().unwrap();
    assert_eq!(doc.initiative_id.as_deref(), Some(initiative.id.as_str()));
}

#[tokio::test]
async fn test_focus_moves_between_initiatives() {
    let (engine, _repo) = setup().await;
    let first = engine.ctx.initiatives.create("acme", "First", None).unwrap();
    let second = engine.ctx.initiatives.create("acme", "Second", None).unwrap();

    let focused = engine.ctx.initiatives.focused("acme").unwrap().unwrap();
    assert_eq!(focused.id, second.id);

    engine.ctx.initiatives.focus("acme", "First").unwrap();
    let focused = engine.ctx.initiatives.focused("acme").unwrap().unwrap();
    assert_eq!(focused.id, first.id);
    let all = engine.ctx.initiatives.list("acme", None).unwrap();
    assert_eq!(all.iter().filter(|i| i.focused).count(), 1);
}

#[tokio::test]
async fn test_completion_language_prompts_but_does_not_complete() {
    let (engine, _repo) = setup().await;
    let initiative = engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();

    let saved = engine
        .ctx
        .writer
        .save_commit_summary(CommitSummaryInput {
            repository: "acme".into(),
            summary: "Shipped the bounded backoff; the overhaul is done".into(),
            changed_files: vec!["src/retry.rs".into()],
            session_id: Some("sess-42".into()),
            initiative: None,
        })
        .unwrap();

    assert!(saved.completion_signal);
    assert_eq!(saved.prompt, Some("mark_complete"));
    let still = engine.ctx.initiatives.resolve("acme", &initiative.id).unwrap();
    assert_eq!(still.status, InitiativeStatus::Active);

    let completed = engine
        .ctx
        .initiatives
        .complete("acme", "Retry overhaul", "Backoff bounded and tested")
        .unwrap();
    assert_eq!(completed.status, InitiativeStatus::Completed);
    assert!(!completed.focused);
    assert!(engine.ctx.initiatives.focused("acme").unwrap().is_none());
}

#[tokio::test]
async fn test_completed_initiative_rejects_transitions() {
    let (engine, _repo) = setup().await;
    engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();
    engine
        .ctx
        .initiatives
        .complete("acme", "Retry overhaul", "done")
        .unwrap();

    let refocus = engine.ctx.initiatives.focus("acme", "Retry overhaul").unwrap_err();
    assert!(matches!(refocus, EngramError::InvalidTransition(_)));
    let again = engine
        .ctx
        .initiatives
        .complete("acme", "Retry overhaul", "done twice")
        .unwrap_err();
    assert!(matches!(again, EngramError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_exclusive_search_keeps_only_tagged_memory() {
    let (engine, _repo) = setup().await;
    engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "retry budget predates the overhaul"))
        .unwrap();
    let initiative = engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();
    let tagged = engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "retry budget is now five attempts"))
        .unwrap();

    let response = engine
        .ctx
        .search
        .search(SearchRequest::new("retry budget", "acme").initiative(&initiative.id, true))
        .await
        .unwrap();

    assert!(response.results.iter().any(|h| h.id == tagged.id));
    assert!(response
        .results
        .iter()
        .all(|h| h.initiative_id.as_deref() == Some(initiative.id.as_str())
            || matches!(h.doc_type, DocumentType::Skeleton | DocumentType::TechStack)));
}

#[tokio::test]
async fn test_focused_initiative_boosts_its_memory() {
    let (engine, _repo) = setup().await;
    engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();
    let tagged = engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "retry budget is five attempts"))
        .unwrap();

    let response = engine.search("retry budget", "acme").await;

    let hit = response.results.iter().find(|h| h.id == tagged.id).unwrap();
    assert!(hit.scores.initiative_boost > 1.0);
}

#[tokio::test]
async fn test_idle_initiative_triggers_orientation_prompt() {
    let (engine, _repo) = setup().await;
    let mut initiative = engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();
    engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "halfway through the backoff rewrite"))
        .unwrap();

    let fresh = engine.ctx.initiatives.orientation("acme").unwrap();
    assert!(fresh.prompt.is_none());
    assert_eq!(fresh.recent_context.len(), 1);

    initiative.last_activity_at = Utc::now() - Duration::days(12);
    engine.ctx.storage.update_initiative(&initiative).unwrap();

    let orientation = engine.ctx.initiatives.orientation("acme").unwrap();
    let prompt = orientation.prompt.expect("idle initiative should prompt");
    assert_eq!(prompt.initiative_id, initiative.id);
    assert!(prompt.days_inactive >= 12);
    assert_eq!(orientation.focused.unwrap().id, initiative.id);
}

#[tokio::test]
async fn test_duplicate_names_are_rejected() {
    let (engine, _repo) = setup().await;
    engine.ctx.initiatives.create("acme", "Retry overhaul", None).unwrap();

    let err = engine
        .ctx
        .initiatives
        .create("acme", "Retry overhaul", None)
        .unwrap_err();

    assert!(matches!(err, EngramError::InvalidTransition(_)));
    // Same name in another repository is fine
    engine.ctx.initiatives.create("other", "Retry overhaul", None).unwrap();
}
