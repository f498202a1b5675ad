//! Initiative State Machine
//!
//! Initiatives group multi-session work. A repository has at most one focused
//! initiative; documents written while one is focused are tagged with its id.
//!
//! ```text
//! create ──► active (focused) ──complete──► completed
//!               │   ▲
//!         focus │   │ focus
//!               ▼   │
//!           active (unfocused)
//! ```

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, LazyLock};

use crate::config::DEFAULT_INITIATIVE_STALE_DAYS;
use crate::embeddings::Embedder;
use crate::error::{EngramError, Result};
use crate::memory::{random_id, Document, DocumentType};
use crate::storage::{DocumentFilter, DocumentStore, InitiativeStore, Store};

/// Phrases that suggest a piece of work has wrapped up
pub const COMPLETION_SIGNALS: [&str; 10] = [
    "complete",
    "completed",
    "done",
    "finished",
    "final",
    "shipped",
    "merged",
    "released",
    "wrapped up",
    "closes",
];

/// Prompt kind surfaced when the focused initiative has gone quiet
pub const STALE_PROMPT: &str = "still_working_or_complete";

static COMPLETION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = COMPLETION_SIGNALS.iter().map(|s| regex::escape(s)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
        .expect("completion lexicon is a valid pattern")
});

// ============================================================================
// TYPES
// ============================================================================

/// Lifecycle state of an initiative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiativeStatus {
    Active,
    Completed,
}

impl InitiativeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitiativeStatus::Active => "active",
            InitiativeStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for InitiativeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InitiativeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(InitiativeStatus::Active),
            "completed" => Ok(InitiativeStatus::Completed),
            other => Err(format!("Unknown initiative status: {}", other)),
        }
    }
}

/// A tracked unit of multi-session work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiative {
    pub id: String,
    pub repository: String,
    pub name: String,
    pub goal: Option<String>,
    pub status: InitiativeStatus,
    pub focused: bool,
    /// Free-text progress note set through `update_status`
    pub status_text: Option<String>,
    /// Completion summary
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Initiative {
    /// New active initiative, focused on creation
    pub fn new(repository: impl Into<String>, name: impl Into<String>, goal: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: random_id(DocumentType::Initiative),
            repository: repository.into(),
            name: name.into(),
            goal,
            status: InitiativeStatus::Active,
            focused: true,
            status_text: None,
            summary: None,
            created_at: now,
            last_activity_at: now,
            completed_at: None,
        }
    }

    /// Whole days since the last recorded activity
    pub fn days_inactive(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_activity_at).num_days()
    }

    /// Searchable body of the initiative's document
    fn document_text(&self) -> String {
        let mut text = self.name.clone();
        if let Some(goal) = &self.goal {
            text.push_str("\n\nGoal: ");
            text.push_str(goal);
        }
        if let Some(status) = &self.status_text {
            text.push_str("\n\nStatus: ");
            text.push_str(status);
        }
        if let Some(summary) = &self.summary {
            text.push_str("\n\nCompletion Summary: ");
            text.push_str(summary);
        }
        text
    }
}

/// Whether free text contains a completion phrase
pub fn detect_completion_signals(text: &str) -> bool {
    COMPLETION_PATTERN.is_match(text)
}

/// Recent note or summary attached to an initiative
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextItem {
    pub id: String,
    pub doc_type: DocumentType,
    pub created_at: DateTime<Utc>,
    pub preview: String,
}

/// Ask whether a quiet initiative is still in progress
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessPrompt {
    pub kind: &'static str,
    pub initiative_id: String,
    pub name: String,
    pub days_inactive: i64,
    pub message: String,
}

/// Session-start view of a repository's initiatives
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Orientation {
    pub repository: String,
    pub focused: Option<Initiative>,
    pub active: Vec<Initiative>,
    pub recent_context: Vec<ContextItem>,
    pub prompt: Option<StalenessPrompt>,
}

// ============================================================================
// MANAGER
// ============================================================================

/// Applies initiative transitions and keeps the initiative documents searchable
pub struct InitiativeManager {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    stale_days: i64,
}

impl InitiativeManager {
    pub fn new(store: Arc<dyn Store>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            stale_days: DEFAULT_INITIATIVE_STALE_DAYS,
        }
    }

    pub fn with_stale_days(mut self, days: i64) -> Self {
        self.stale_days = days;
        self
    }

    /// Create an active initiative and focus it
    pub fn create(&self, repository: &str, name: &str, goal: Option<String>) -> Result<Initiative> {
        let name = name.trim();
        if repository.is_empty() || name.is_empty() {
            return Err(EngramError::InvalidInput(
                "initiative needs a repository and a name".to_string(),
            ));
        }
        let existing = self
            .store
            .initiative_by_name(repository, name)
            .map_err(|e| EngramError::store("initiative.lookup", false, e))?;
        if existing.is_some() {
            return Err(EngramError::InvalidTransition(format!(
                "initiative '{}' already exists in '{}'",
                name, repository
            )));
        }

        let goal = goal.filter(|g| !g.trim().is_empty());
        let initiative = Initiative::new(repository, name, goal);
        self.store
            .insert_initiative(&initiative)
            .map_err(|e| EngramError::store("initiative.create", false, e))?;
        self.sync_document(&initiative, "initiative.create")?;

        tracing::info!(repository, id = %initiative.id, name, "Initiative created and focused");
        Ok(initiative)
    }

    /// Focus an active initiative, unfocusing every other one in the repository
    pub fn focus(&self, repository: &str, id_or_name: &str) -> Result<Initiative> {
        let mut initiative = self.resolve(repository, id_or_name)?;
        if initiative.status == InitiativeStatus::Completed {
            return Err(EngramError::InvalidTransition(format!(
                "cannot focus completed initiative '{}'",
                initiative.name
            )));
        }
        self.store
            .set_focus(repository, &initiative.id)
            .map_err(|e| EngramError::store("initiative.focus", false, e))?;
        initiative.focused = true;
        tracing::info!(repository, id = %initiative.id, "Initiative focused");
        Ok(initiative)
    }

    /// Mark an initiative completed with a summary; it loses focus
    pub fn complete(&self, repository: &str, id_or_name: &str, summary: &str) -> Result<Initiative> {
        if summary.trim().is_empty() {
            return Err(EngramError::InvalidInput(
                "a completion summary is required".to_string(),
            ));
        }
        let mut initiative = self.resolve(repository, id_or_name)?;
        if initiative.status == InitiativeStatus::Completed {
            return Err(EngramError::InvalidTransition(format!(
                "initiative '{}' is already completed",
                initiative.name
            )));
        }

        let now = Utc::now();
        initiative.status = InitiativeStatus::Completed;
        initiative.focused = false;
        initiative.summary = Some(summary.trim().to_string());
        initiative.completed_at = Some(now);
        initiative.last_activity_at = now;
        self.store
            .update_initiative(&initiative)
            .map_err(|e| EngramError::store("initiative.complete", false, e))?;
        self.sync_document(&initiative, "initiative.complete")?;

        tracing::info!(repository, id = %initiative.id, "Initiative completed");
        Ok(initiative)
    }

    /// Record progress text on the focused initiative
    pub fn update_status(&self, repository: &str, status_text: &str) -> Result<Initiative> {
        let mut initiative = self.focused(repository)?.ok_or_else(|| {
            EngramError::InvalidTransition(format!(
                "no focused initiative in '{}' to update",
                repository
            ))
        })?;
        initiative.status_text = Some(status_text.trim().to_string());
        initiative.last_activity_at = Utc::now();
        self.store
            .update_initiative(&initiative)
            .map_err(|e| EngramError::store("initiative.update_status", false, e))?;
        self.sync_document(&initiative, "initiative.update_status")?;
        Ok(initiative)
    }

    pub fn list(&self, repository: &str, status: Option<InitiativeStatus>) -> Result<Vec<Initiative>> {
        self.store
            .initiatives(repository, status)
            .map_err(|e| EngramError::store("initiative.list", false, e))
    }

    pub fn focused(&self, repository: &str) -> Result<Option<Initiative>> {
        self.store
            .focused_initiative(repository)
            .map_err(|e| EngramError::store("initiative.focused", false, e))
    }

    /// Look an initiative up by id, then by name
    pub fn resolve(&self, repository: &str, id_or_name: &str) -> Result<Initiative> {
        let by_id = self
            .store
            .initiative(id_or_name)
            .map_err(|e| EngramError::store("initiative.lookup", false, e))?
            .filter(|i| i.repository == repository);
        if let Some(initiative) = by_id {
            return Ok(initiative);
        }
        self.store
            .initiative_by_name(repository, id_or_name.trim())
            .map_err(|e| EngramError::store("initiative.lookup", false, e))?
            .ok_or_else(|| EngramError::InitiativeNotFound(id_or_name.to_string()))
    }

    /// Bump `last_activity_at`
    pub fn touch(&self, initiative: &Initiative) -> Result<()> {
        let mut touched = initiative.clone();
        touched.last_activity_at = Utc::now();
        self.store
            .update_initiative(&touched)
            .map_err(|e| EngramError::store("initiative.touch", false, e))
    }

    /// Focused initiative, active initiatives, recent context and a
    /// staleness prompt when the focused one has been idle too long
    pub fn orientation(&self, repository: &str) -> Result<Orientation> {
        let focused = self.focused(repository)?;
        let active = self.list(repository, Some(InitiativeStatus::Active))?;
        let now = Utc::now();

        let mut recent_context = Vec::new();
        let mut prompt = None;
        if let Some(initiative) = &focused {
            recent_context = self.recent_context(initiative, 5)?;
            if now - initiative.last_activity_at > Duration::days(self.stale_days) {
                let days = initiative.days_inactive(now);
                tracing::debug!(repository, id = %initiative.id, days, "Focused initiative is idle");
                prompt = Some(StalenessPrompt {
                    kind: STALE_PROMPT,
                    initiative_id: initiative.id.clone(),
                    name: initiative.name.clone(),
                    days_inactive: days,
                    message: format!(
                        "'{}' has had no activity for {} days. Still working on it, or is it complete?",
                        initiative.name, days
                    ),
                });
            }
        }

        Ok(Orientation {
            repository: repository.to_string(),
            focused,
            active,
            recent_context,
            prompt,
        })
    }

    fn recent_context(&self, initiative: &Initiative, limit: usize) -> Result<Vec<ContextItem>> {
        let filter = DocumentFilter {
            repository: Some(initiative.repository.clone()),
            types: Some(vec![DocumentType::Note, DocumentType::CommitSummary]),
            initiative_id: Some(initiative.id.clone()),
            ..Default::default()
        };
        let mut docs = self
            .store
            .find(&filter, 1000)
            .map_err(|e| EngramError::store("initiative.recent_context", false, e))?;
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs
            .into_iter()
            .take(limit)
            .map(|d| ContextItem {
                preview: d.preview(200),
                id: d.id,
                doc_type: d.doc_type,
                created_at: d.created_at,
            })
            .collect())
    }

    /// Upsert the initiative's searchable document
    fn sync_document(&self, initiative: &Initiative, operation: &'static str) -> Result<()> {
        let mut doc = Document::new(
            initiative.id.clone(),
            DocumentType::Initiative,
            initiative.repository.clone(),
            initiative.document_text(),
        );
        doc.initiative_id = Some(initiative.id.clone());
        doc.metadata = serde_json::json!({
            "name": initiative.name,
            "status": initiative.status.as_str(),
        });
        let embedding = match self.embedder.embed(&doc.content) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(id = %initiative.id, "Initiative stored without embedding: {}", e);
                None
            }
        };
        self.store
            .upsert(&doc, embedding.as_deref())
            .map_err(|e| EngramError::store(operation, true, e))
    }
}

// ============================================================================
// TESTS
// ============================================================================
