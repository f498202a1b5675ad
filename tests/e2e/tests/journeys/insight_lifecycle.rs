//! # Insight Lifecycle Journey
//!
//! Tests how stored understanding tracks the code it describes:
//! 1. An insight records hashes of its linked files
//! 2. Editing a linked file makes retrieval flag the insight
//! 3. Explicit validation refreshes it
//! 4. Deleting the file or deprecating the insight changes its status

use engram_core::{
    EngramError, InsightStatus, SaveOutcome, ValidationOutcome, ValidationRequest,
};
use engram_e2e_tests::{TestDataFactory, TestEngine, TestRepo};

const AUTH_INSIGHT: &str = "authenticate compares a sha256 auth hash of the password";

async fn setup() -> (TestEngine, TestRepo, SaveOutcome) {
    let engine = TestEngine::new_temp();
    let repo = TestRepo::with_files(&[TestDataFactory::auth_module(), TestDataFactory::rust_retry()]);
    engine.ingest(&repo).await;
    let saved = engine
        .ctx
        .writer
        .save_insight(TestDataFactory::insight("acme", "auth.py", AUTH_INSIGHT))
        .unwrap();
    (engine, repo, saved)
}

#[tokio::test]
async fn test_new_insight_is_fresh() {
    let (engine, _repo, saved) = setup().await;

    let report = engine.ctx.validator.staleness(&saved.id).unwrap().unwrap();

    assert_eq!(report.level, InsightStatus::Fresh);
    assert!(!report.verification_required);
    assert!(report.warning.is_empty());
}

#[tokio::test]
async fn test_edited_file_flags_insight_in_search() {
    let (engine, repo, saved) = setup().await;
    repo.write("auth.py", "def authenticate(user, password):\n    return bcrypt_check(user, password)\n");

    let response = engine.search("auth hash authenticate", "acme").await;

    let hit = response
        .results
        .iter()
        .find(|h| h.id == saved.id)
        .expect("insight missing from results");
    let staleness = hit.staleness.as_ref().expect("insight hits carry staleness");
    assert_eq!(staleness.level, InsightStatus::LikelyStale);
    assert!(staleness.verification_required);
    assert_eq!(staleness.files_changed, vec!["auth.py".to_string()]);
    assert!(!staleness.warning.is_empty());
    assert!(response.staleness_summary.verification_required_count >= 1);
}

#[tokio::test]
async fn test_search_does_not_persist_staleness() {
    let (engine, repo, saved) = setup().await;
    repo.write("auth.py", "def authenticate():\n    return True\n");

    engine.search("auth hash", "acme").await;

    let doc = engine.metadata(&saved.id);
    assert_eq!(doc["status"], "fresh");
}

#[tokio::test]
async fn test_still_valid_refreshes_hashes() {
    let (engine, repo, saved) = setup().await;
    repo.write("auth.py", "def authenticate():\n    return True\n");

    let result = engine
        .ctx
        .validator
        .validate(ValidationRequest::new(&saved.id, ValidationOutcome::StillValid))
        .unwrap();

    assert_eq!(result.status, InsightStatus::Fresh);
    assert!(result.file_hashes_refreshed);
    let report = engine.ctx.validator.staleness(&saved.id).unwrap().unwrap();
    assert_eq!(report.level, InsightStatus::Fresh);
}

#[tokio::test]
async fn test_deleted_file_is_reported() {
    let (engine, repo, saved) = setup().await;
    repo.delete("auth.py");

    let report = engine.ctx.validator.staleness(&saved.id).unwrap().unwrap();

    assert_eq!(report.level, InsightStatus::FilesDeleted);
    assert!(report.verification_required);
    assert_eq!(report.files_deleted, vec!["auth.py".to_string()]);
}

#[tokio::test]
async fn test_deprecation_with_replacement() {
    let (engine, _repo, saved) = setup().await;
    let mut request = ValidationRequest::new(&saved.id, ValidationOutcome::NoLongerValid);
    request.deprecate = true;
    request.replacement = Some("authenticate now delegates to bcrypt".to_string());

    let result = engine.ctx.validator.validate(request).unwrap();

    assert!(result.deprecated);
    let replacement_id = result.replacement_id.expect("replacement created");
    let old = engine.ctx.validator.staleness(&saved.id).unwrap().unwrap();
    assert_eq!(old.level, InsightStatus::Deprecated);
    assert_eq!(old.replacement_id.as_deref(), Some(replacement_id.as_str()));

    let new = engine.ctx.validator.staleness(&replacement_id).unwrap().unwrap();
    assert_eq!(new.level, InsightStatus::Fresh);
    let doc = engine.metadata(&replacement_id);
    assert_eq!(doc["replacesId"], saved.id.as_str());
    assert_eq!(doc["linkedFiles"][0], "auth.py");
}

#[tokio::test]
async fn test_deprecated_insight_cannot_be_revalidated() {
    let (engine, _repo, saved) = setup().await;
    let mut request = ValidationRequest::new(&saved.id, ValidationOutcome::NoLongerValid);
    request.deprecate = true;
    engine.ctx.validator.validate(request).unwrap();

    let err = engine
        .ctx
        .validator
        .validate(ValidationRequest::new(&saved.id, ValidationOutcome::StillValid))
        .unwrap_err();

    assert!(matches!(err, EngramError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_unknown_insight_is_not_found() {
    let (engine, _repo, _saved) = setup().await;

    let err = engine
        .ctx
        .validator
        .validate(ValidationRequest::new("insight:missing", ValidationOutcome::StillValid))
        .unwrap_err();

    assert!(matches!(err, EngramError::ValidationNotFound(_)));
}
