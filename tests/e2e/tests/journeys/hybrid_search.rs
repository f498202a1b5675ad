//! # Hybrid Search Journey
//!
//! Tests retrieval over an ingested repository plus saved memory:
//! 1. Semantic and lexical legs fuse into one ranked list
//! 2. Derived knowledge outranks raw code for the same query
//! 3. Code is scoped to the requested branch and trunk; notes are not
//! 4. Identical queries produce identical rankings

use engram_core::{DocumentType, EngramError, SearchRequest};
use engram_e2e_tests::{TestDataFactory, TestEngine, TestRepo};

async fn retry_repo(engine: &TestEngine) -> TestRepo {
    let repo = TestRepo::with_files(&[TestDataFactory::rust_retry(), TestDataFactory::auth_module()]);
    engine.ingest(&repo).await;
    repo
}

#[tokio::test]
async fn test_code_is_found_by_its_identifiers() {
    let engine = TestEngine::new_temp();
    retry_repo(&engine).await;

    let response = engine.search("retry delay backoff", "acme").await;

    let top_code = response
        .results
        .iter()
        .find(|h| h.doc_type == DocumentType::Code)
        .expect("no code hit");
    assert_eq!(top_code.path.as_deref(), Some("src/retry.rs"));
    assert!(top_code.scores.final_score > 0.0);
    assert!(top_code.scores.lexical.is_some());
    assert_eq!(response.branches, Some(vec!["main".to_string()]));
}

#[tokio::test]
async fn test_insight_outranks_code() {
    let engine = TestEngine::new_temp();
    retry_repo(&engine).await;
    let saved = engine
        .ctx
        .writer
        .save_insight(TestDataFactory::insight(
            "acme",
            "src/retry.rs",
            "Retry backoff doubles the delay per attempt and caps the exponent at six",
        ))
        .unwrap();

    let response = engine.search("retry backoff delay", "acme").await;

    assert_eq!(response.results[0].id, saved.id);
    assert_eq!(response.results[0].doc_type, DocumentType::Insight);
    assert!(response.results.iter().any(|h| h.doc_type == DocumentType::Code));
}

#[tokio::test]
async fn test_ranking_is_deterministic() {
    let engine = TestEngine::new_temp();
    retry_repo(&engine).await;
    engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "We retry token refresh twice before failing auth"))
        .unwrap();

    let first: Vec<String> = engine
        .search("retry auth token", "acme")
        .await
        .results
        .into_iter()
        .map(|h| h.id)
        .collect();
    for _ in 0..3 {
        let again: Vec<String> = engine
            .search("retry auth token", "acme")
            .await
            .results
            .into_iter()
            .map(|h| h.id)
            .collect();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn test_branch_filter_scopes_code_but_not_notes() {
    let engine = TestEngine::new_temp();
    let repo = retry_repo(&engine).await;

    repo.checkout_new_branch("feature-x");
    repo.write("flux.py", "def quantum_flux(capacitor):\n    return capacitor * 88\n");
    repo.commit_all("add flux");
    engine.ingest(&repo).await;
    engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "Decided the quantum flux capacitor stays at 88"))
        .unwrap();

    // Checked out on feature-x: its code and trunk code are both visible
    let here = engine.search("quantum flux capacitor", "acme").await;
    assert!(here.results.iter().any(|h| h.path.as_deref() == Some("flux.py")));

    let on_main = engine
        .ctx
        .search
        .search(SearchRequest::new("quantum flux capacitor", "acme").branch("main"))
        .await
        .unwrap();
    assert_eq!(on_main.branches, Some(vec!["main".to_string()]));
    assert!(on_main.results.iter().all(|h| h.path.as_deref() != Some("flux.py")));
    assert!(on_main.results.iter().any(|h| h.doc_type == DocumentType::Note));
}

#[tokio::test]
async fn test_type_filter_limits_results() {
    let engine = TestEngine::new_temp();
    retry_repo(&engine).await;
    engine
        .ctx
        .writer
        .save_note(TestDataFactory::note("acme", "retry budget is five attempts"))
        .unwrap();

    let response = engine
        .ctx
        .search
        .search(SearchRequest::new("retry attempts", "acme").types(vec![DocumentType::Note]))
        .await
        .unwrap();

    assert!(!response.results.is_empty());
    assert!(response.results.iter().all(|h| h.doc_type == DocumentType::Note));
}

#[tokio::test]
async fn test_result_count_respects_rerank_limit() {
    let engine = TestEngine::new_temp();
    retry_repo(&engine).await;
    for i in 0..6 {
        engine
            .ctx
            .writer
            .save_note(TestDataFactory::note("acme", &format!("retry note number {i}")))
            .unwrap();
    }

    let response = engine
        .ctx
        .search
        .search(SearchRequest::new("retry note", "acme").limits(20, 3))
        .await
        .unwrap();

    assert_eq!(response.results.len(), 3);
    assert!(response.total_candidates >= 6);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let engine = TestEngine::new_temp();
    retry_repo(&engine).await;

    let err = engine
        .ctx
        .search
        .search(SearchRequest::new("   ", "acme"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngramError::InvalidInput(_)));
}
