//! Insight tracking metadata
//!
//! Insights remember the content hashes of the files they describe so that
//! later reads can tell whether the understanding still matches the code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Freshness of an insight relative to the files it links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsightStatus {
    #[default]
    Fresh,
    PossiblyStale,
    LikelyStale,
    FilesDeleted,
    Deprecated,
}

impl InsightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightStatus::Fresh => "fresh",
            InsightStatus::PossiblyStale => "possibly_stale",
            InsightStatus::LikelyStale => "likely_stale",
            InsightStatus::FilesDeleted => "files_deleted",
            InsightStatus::Deprecated => "deprecated",
        }
    }

    /// Whether callers must re-read the linked files before trusting the insight
    pub fn requires_verification(&self) -> bool {
        matches!(self, InsightStatus::LikelyStale | InsightStatus::FilesDeleted)
    }
}

impl std::fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Explicit validation outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    StillValid,
    PartiallyValid,
    NoLongerValid,
}

impl std::str::FromStr for ValidationOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "still_valid" => Ok(ValidationOutcome::StillValid),
            "partially_valid" => Ok(ValidationOutcome::PartiallyValid),
            "no_longer_valid" => Ok(ValidationOutcome::NoLongerValid),
            other => Err(format!(
                "Unknown validation outcome '{}' (expected still_valid, partially_valid, no_longer_valid)",
                other
            )),
        }
    }
}

/// Record of the most recent explicit validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub outcome: ValidationOutcome,
    pub notes: Option<String>,
    pub validated_at: DateTime<Utc>,
}

/// Metadata stored on every insight document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightMeta {
    pub title: String,
    /// Repository-relative paths this insight describes
    pub linked_files: Vec<String>,
    /// Content hash of each linked file when last verified
    pub file_hashes: BTreeMap<String, String>,
    /// Repository root used to resolve `linked_files`
    pub repo_root: Option<PathBuf>,
    pub verified_at: DateTime<Utc>,
    #[serde(default)]
    pub status: InsightStatus,
    pub replacement_id: Option<String>,
    /// The insight this one superseded
    pub replaces_id: Option<String>,
    pub last_validation: Option<ValidationRecord>,
}

impl InsightMeta {
    /// Fresh metadata with hashes captured now
    pub fn new(
        title: impl Into<String>,
        linked_files: Vec<String>,
        file_hashes: BTreeMap<String, String>,
        repo_root: Option<PathBuf>,
    ) -> Self {
        Self {
            title: title.into(),
            linked_files,
            file_hashes,
            repo_root,
            verified_at: Utc::now(),
            status: InsightStatus::Fresh,
            replacement_id: None,
            replaces_id: None,
            last_validation: None,
        }
    }

    /// Record a successful validation against the current file hashes
    ///
    /// This is the only path back to `Fresh`.
    pub(crate) fn revalidate(
        &mut self,
        current_hashes: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        if self.status == InsightStatus::Deprecated {
            return Err("deprecated insights cannot be revalidated".to_string());
        }
        self.file_hashes = current_hashes;
        self.verified_at = now;
        self.status = InsightStatus::Fresh;
        Ok(())
    }

    /// Mark as deprecated, optionally pointing at a replacement
    pub(crate) fn deprecate(&mut self, replacement_id: Option<String>) -> Result<(), String> {
        if self.status == InsightStatus::Deprecated {
            return Err("insight is already deprecated".to_string());
        }
        self.status = InsightStatus::Deprecated;
        self.replacement_id = replacement_id;
        Ok(())
    }
}
