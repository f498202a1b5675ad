//! Staleness & Validation
//!
//! Read-side staleness classification of insights and notes, and the
//! explicit validate action that moves an insight back to fresh or retires it.
//!
//! Classification never writes; only [`Validator::validate`] changes state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DEFAULT_STALENESS_DAYS;
use crate::error::{EngramError, Result};
use crate::ingest::hash_file;
use crate::memory::{
    Document, DocumentType, InsightInput, InsightMeta, InsightStatus, MemoryWriter,
    ValidationOutcome, ValidationRecord,
};
use crate::storage::{DocumentStore, Store};

// ============================================================================
// FILE HASHES
// ============================================================================

/// Hash every linked file that exists under `root`
///
/// Missing or unreadable files are left out of the map.
pub fn compute_file_hashes(root: &Path, files: &[String]) -> BTreeMap<String, String> {
    let mut hashes = BTreeMap::new();
    for file in files {
        let path = resolve(root, file);
        if !path.is_file() {
            continue;
        }
        match hash_file(&path) {
            Ok(hash) => {
                hashes.insert(file.clone(), hash);
            }
            Err(e) => tracing::warn!(file = %file, "Could not hash linked file: {}", e),
        }
    }
    hashes
}

fn resolve(root: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ============================================================================
// STALENESS REPORT
// ============================================================================

/// Read-time freshness of one document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessReport {
    pub level: InsightStatus,
    /// The caller must re-read the linked files before trusting the content
    pub verification_required: bool,
    pub reasons: Vec<String>,
    pub files_changed: Vec<String>,
    pub files_deleted: Vec<String>,
    pub days_since_verified: i64,
    pub replacement_id: Option<String>,
    /// Human-readable warning, empty when fresh
    pub warning: String,
}

impl StalenessReport {
    fn new(days_since_verified: i64) -> Self {
        Self {
            level: InsightStatus::Fresh,
            verification_required: false,
            reasons: Vec::new(),
            files_changed: Vec::new(),
            files_deleted: Vec::new(),
            days_since_verified,
            replacement_id: None,
            warning: String::new(),
        }
    }

    fn finish(mut self, doc_type: DocumentType) -> Self {
        self.verification_required = self.level.requires_verification();
        self.warning = verification_warning(&self, doc_type);
        self
    }
}

/// Classify an insight against the files it links
///
/// Deprecated beats deleted files, which beat changed files, which beat age.
/// Without a known repository root only the age check applies.
pub fn check_insight(
    meta: &InsightMeta,
    root: Option<&Path>,
    staleness_days: i64,
    now: DateTime<Utc>,
) -> StalenessReport {
    let mut report = StalenessReport::new((now - meta.verified_at).num_days().max(0));

    if meta.status == InsightStatus::Deprecated {
        report.level = InsightStatus::Deprecated;
        report.replacement_id = meta.replacement_id.clone();
        report.reasons.push("Insight has been deprecated".to_string());
        return report.finish(DocumentType::Insight);
    }

    match root.or(meta.repo_root.as_deref()) {
        Some(root) => {
            for file in &meta.linked_files {
                let path = resolve(root, file);
                if !path.is_file() {
                    report.files_deleted.push(file.clone());
                    continue;
                }
                // Files never hashed at write time cannot be compared
                let Some(stored) = meta.file_hashes.get(file) else {
                    continue;
                };
                match hash_file(&path) {
                    Ok(current) if &current != stored => report.files_changed.push(file.clone()),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(file = %file, "Could not hash linked file: {}", e),
                }
            }
        }
        None => report
            .reasons
            .push("Repository root unknown; linked files not checked".to_string()),
    }

    if !report.files_deleted.is_empty() {
        report.level = InsightStatus::FilesDeleted;
        report.reasons.push(format!(
            "Linked file(s) deleted: {}",
            report.files_deleted.join(", ")
        ));
    } else if !report.files_changed.is_empty() {
        report.level = InsightStatus::LikelyStale;
        report.reasons.push(format!(
            "Linked file(s) modified: {}",
            report.files_changed.join(", ")
        ));
    } else if report.days_since_verified >= staleness_days {
        report.level = InsightStatus::PossiblyStale;
        report
            .reasons
            .push(format!("Not verified in {} days", report.days_since_verified));
    }
    report.finish(DocumentType::Insight)
}

/// Time-based staleness for notes; advisory only
pub fn check_note(doc: &Document, staleness_days: i64, now: DateTime<Utc>) -> StalenessReport {
    let mut report = StalenessReport::new((now - doc.updated_at).num_days().max(0));
    if report.days_since_verified >= staleness_days {
        report.level = InsightStatus::PossiblyStale;
        report
            .reasons
            .push(format!("Note is {} days old", report.days_since_verified));
    }
    report.finish(DocumentType::Note)
}

/// Staleness of any document that carries it: insights and notes
pub fn staleness_for(
    doc: &Document,
    root: Option<&Path>,
    staleness_days: i64,
    now: DateTime<Utc>,
) -> Option<StalenessReport> {
    match doc.doc_type {
        DocumentType::Insight => {
            let meta: InsightMeta = doc.metadata_as()?;
            Some(check_insight(&meta, root, staleness_days, now))
        }
        DocumentType::Note => Some(check_note(doc, staleness_days, now)),
        _ => None,
    }
}

fn verification_warning(report: &StalenessReport, doc_type: DocumentType) -> String {
    let kind = doc_type.as_str();
    match report.level {
        InsightStatus::Deprecated => match &report.replacement_id {
            Some(id) => format!("DEPRECATED: This {kind} has been marked invalid. See replacement: {id}"),
            None => format!("DEPRECATED: This {kind} has been marked invalid."),
        },
        InsightStatus::FilesDeleted => format!(
            "VERIFICATION REQUIRED - FILES DELETED: The files this {kind} references ({}) no longer \
             exist. This {kind} may be obsolete. DO NOT TRUST without investigation.",
            report.files_deleted.join(", ")
        ),
        InsightStatus::LikelyStale => format!(
            "VERIFICATION REQUIRED - FILES CHANGED: This {kind} references files that have been \
             modified since it was verified ({}). Re-read these files before using this information.",
            report.files_changed.join(", ")
        ),
        InsightStatus::PossiblyStale => format!(
            "POSSIBLY OUTDATED: This {kind} is {} days old and has not been verified recently. \
             Consider validating before relying on it heavily.",
            report.days_since_verified
        ),
        InsightStatus::Fresh => String::new(),
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Explicit validation of one insight
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub insight_id: String,
    pub outcome: ValidationOutcome,
    pub notes: Option<String>,
    /// Only meaningful with `NoLongerValid`
    pub deprecate: bool,
    /// Content of a new insight superseding the deprecated one
    pub replacement: Option<String>,
}

impl ValidationRequest {
    pub fn new(insight_id: impl Into<String>, outcome: ValidationOutcome) -> Self {
        Self {
            insight_id: insight_id.into(),
            outcome,
            notes: None,
            deprecate: false,
            replacement: None,
        }
    }
}

/// What a validation changed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub insight_id: String,
    pub outcome: ValidationOutcome,
    pub status: InsightStatus,
    pub verified_at: DateTime<Utc>,
    pub file_hashes_refreshed: bool,
    pub deprecated: bool,
    pub replacement_id: Option<String>,
}

/// Applies validation outcomes and answers staleness queries by id
pub struct Validator {
    store: Arc<dyn Store>,
    writer: Arc<MemoryWriter>,
    staleness_days: i64,
}

impl Validator {
    pub fn new(store: Arc<dyn Store>, writer: Arc<MemoryWriter>) -> Self {
        Self {
            store,
            writer,
            staleness_days: DEFAULT_STALENESS_DAYS,
        }
    }

    pub fn with_staleness_days(mut self, days: i64) -> Self {
        self.staleness_days = days;
        self
    }

    /// Current staleness of a stored insight or note
    pub fn staleness(&self, id: &str) -> Result<Option<StalenessReport>> {
        let Some(doc) = self
            .store
            .get(id)
            .map_err(|e| EngramError::store("validation.lookup", false, e))?
        else {
            return Ok(None);
        };
        let root = self.repo_root(&doc.repository)?;
        Ok(staleness_for(&doc, root.as_deref(), self.staleness_days, Utc::now()))
    }

    /// Record an explicit validation outcome
    ///
    /// - `still_valid` refreshes hashes and `verified_at`; status becomes fresh
    /// - `partially_valid` refreshes `verified_at` only
    /// - `no_longer_valid` records the outcome; with `deprecate` the insight is
    ///   retired and an optional replacement is created first
    pub fn validate(&self, request: ValidationRequest) -> Result<ValidationResult> {
        let doc = self
            .store
            .get(&request.insight_id)
            .map_err(|e| EngramError::store("validation.lookup", false, e))?
            .filter(|d| d.doc_type == DocumentType::Insight)
            .ok_or_else(|| EngramError::ValidationNotFound(request.insight_id.clone()))?;
        let mut meta: InsightMeta = doc.metadata_as().ok_or_else(|| {
            EngramError::InvalidInput(format!("{} has no insight metadata", doc.id))
        })?;

        if request.replacement.is_some()
            && !(request.outcome == ValidationOutcome::NoLongerValid && request.deprecate)
        {
            return Err(EngramError::InvalidInput(
                "a replacement insight requires no_longer_valid with deprecate".to_string(),
            ));
        }
        if meta.status == InsightStatus::Deprecated {
            return Err(EngramError::InvalidTransition(format!(
                "insight {} is deprecated",
                doc.id
            )));
        }

        let now = Utc::now();
        let mut file_hashes_refreshed = false;
        let mut replacement_id = None;

        match request.outcome {
            ValidationOutcome::StillValid => {
                let root = match self.repo_root(&doc.repository)? {
                    Some(root) => Some(root),
                    None => meta.repo_root.clone(),
                };
                let hashes = match &root {
                    Some(root) => {
                        file_hashes_refreshed = true;
                        compute_file_hashes(root, &meta.linked_files)
                    }
                    None => meta.file_hashes.clone(),
                };
                meta.revalidate(hashes, now)
                    .map_err(EngramError::InvalidTransition)?;
            }
            ValidationOutcome::PartiallyValid => {
                meta.verified_at = now;
            }
            ValidationOutcome::NoLongerValid if request.deprecate => {
                if let Some(content) = request.replacement.clone() {
                    let title = (!meta.title.is_empty()).then(|| format!("{} (Updated)", meta.title));
                    let saved = self.writer.save_insight(InsightInput {
                        repository: doc.repository.clone(),
                        content,
                        linked_files: meta.linked_files.clone(),
                        title,
                        tags: doc.tags.clone(),
                        initiative: doc.initiative_id.clone(),
                        replaces_id: Some(doc.id.clone()),
                    })?;
                    replacement_id = Some(saved.id);
                }
                meta.deprecate(replacement_id.clone())
                    .map_err(EngramError::InvalidTransition)?;
            }
            ValidationOutcome::NoLongerValid => {}
        }

        meta.last_validation = Some(ValidationRecord {
            outcome: request.outcome,
            notes: request.notes.clone(),
            validated_at: now,
        });
        let metadata = serde_json::to_value(&meta)
            .map_err(|e| EngramError::InvalidInput(format!("insight metadata: {e}")))?;
        let updated = self
            .store
            .update_metadata(&doc.id, &metadata)
            .map_err(|e| EngramError::store("validation.persist", replacement_id.is_some(), e))?;
        if !updated {
            return Err(EngramError::ValidationNotFound(doc.id));
        }

        tracing::info!(
            id = %doc.id,
            outcome = ?request.outcome,
            status = %meta.status,
            replacement = ?replacement_id,
            "Insight validated"
        );
        Ok(ValidationResult {
            insight_id: doc.id,
            outcome: request.outcome,
            status: meta.status,
            verified_at: meta.verified_at,
            file_hashes_refreshed,
            deprecated: meta.status == InsightStatus::Deprecated,
            replacement_id,
        })
    }

    fn repo_root(&self, repository: &str) -> Result<Option<PathBuf>> {
        Ok(self
            .store
            .repository(repository)
            .map_err(|e| EngramError::store("validation.repository", false, e))?
            .map(|r| r.root_path))
    }
}

// ============================================================================
// TESTS
// ============================================================================
