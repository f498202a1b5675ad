//! Memory write paths
//!
//! Notes, insights and commit summaries share one pipeline: scrub secrets,
//! resolve the initiative (explicit, else the focused one), record the
//! current branch, embed, upsert, then bump the initiative's activity.

use serde::Serialize;
use std::sync::Arc;

use super::document::{random_id, Document, DocumentType};
use super::insight::InsightMeta;
use crate::embeddings::Embedder;
use crate::error::{EngramError, Result};
use crate::ingest::{locate_repository, RepoLocation, VersionControl};
use crate::initiative::{detect_completion_signals, Initiative, InitiativeManager};
use crate::security::scrub_secrets;
use crate::storage::{DocumentStore, Store};
use crate::validation::compute_file_hashes;

/// Prompt returned when a summary reads like the focused work is done
pub const MARK_COMPLETE_PROMPT: &str = "mark_complete";

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct NoteInput {
    pub repository: String,
    pub content: String,
    pub title: Option<String>,
    pub tags: Vec<String>,
    /// Initiative id or name; the focused initiative when absent
    pub initiative: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InsightInput {
    pub repository: String,
    pub content: String,
    /// Repository-relative paths; at least one is required
    pub linked_files: Vec<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub initiative: Option<String>,
    /// Insight this one supersedes
    pub replaces_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitSummaryInput {
    pub repository: String,
    pub summary: String,
    pub changed_files: Vec<String>,
    /// Stable source id; saving the same session twice overwrites
    pub session_id: Option<String>,
    pub initiative: Option<String>,
}

/// Result of a memory write
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub id: String,
    pub doc_type: DocumentType,
    pub branch: String,
    pub initiative_id: Option<String>,
    pub initiative_name: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub completion_signal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<&'static str>,
}

struct WriteContext {
    location: RepoLocation,
    initiative: Option<Initiative>,
}

// ============================================================================
// WRITER
// ============================================================================

pub struct MemoryWriter {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    initiatives: Arc<InitiativeManager>,
    vcs: Arc<dyn VersionControl>,
}

impl MemoryWriter {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        initiatives: Arc<InitiativeManager>,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            store,
            embedder,
            initiatives,
            vcs,
        }
    }

    pub fn save_note(&self, input: NoteInput) -> Result<SaveOutcome> {
        require("note content", &input.content)?;
        let ctx = self.context(&input.repository, input.initiative.as_deref())?;

        let title = input.title.map(|t| scrub_secrets(t.trim()));
        let mut content = String::new();
        if let Some(title) = title.as_deref().filter(|t| !t.is_empty()) {
            content.push_str(title);
            content.push_str("\n\n");
        }
        content.push_str(&scrub_secrets(&input.content));

        let mut doc = Document::new(
            random_id(DocumentType::Note),
            DocumentType::Note,
            &input.repository,
            content,
        );
        doc.tags = input.tags;
        doc.metadata = serde_json::json!({ "title": title.unwrap_or_default() });
        self.save(doc, &ctx, "memory.save_note", false)
    }

    pub fn save_insight(&self, input: InsightInput) -> Result<SaveOutcome> {
        require("insight content", &input.content)?;
        let linked_files: Vec<String> = input
            .linked_files
            .iter()
            .map(|f| f.trim().trim_start_matches("./").to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if linked_files.is_empty() {
            return Err(EngramError::InvalidInput(
                "an insight must link at least one file".to_string(),
            ));
        }
        let ctx = self.context(&input.repository, input.initiative.as_deref())?;

        let file_hashes = match &ctx.location.root {
            Some(root) => compute_file_hashes(root, &linked_files),
            None => {
                tracing::warn!(
                    repository = %input.repository,
                    "Repository root unknown; insight saved without file hashes"
                );
                Default::default()
            }
        };

        let title = input.title.map(|t| scrub_secrets(t.trim())).unwrap_or_default();
        let mut content = String::new();
        if !title.is_empty() {
            content.push_str(&title);
            content.push_str("\n\n");
        }
        content.push_str(&scrub_secrets(&input.content));
        content.push_str("\n\nLinked files: ");
        content.push_str(&linked_files.join(", "));

        let mut meta = InsightMeta::new(title, linked_files, file_hashes, ctx.location.root.clone());
        meta.replaces_id = input.replaces_id;

        let mut doc = Document::new(
            random_id(DocumentType::Insight),
            DocumentType::Insight,
            &input.repository,
            content,
        );
        doc.tags = input.tags;
        doc.metadata = serde_json::to_value(&meta)
            .map_err(|e| EngramError::InvalidInput(format!("insight metadata: {e}")))?;
        self.save(doc, &ctx, "memory.save_insight", false)
    }

    /// Save a session or commit summary
    ///
    /// When an initiative is in play and the summary contains a completion
    /// phrase, the outcome carries a `mark_complete` prompt. Nothing is
    /// completed automatically.
    pub fn save_commit_summary(&self, input: CommitSummaryInput) -> Result<SaveOutcome> {
        require("summary", &input.summary)?;
        let ctx = self.context(&input.repository, input.initiative.as_deref())?;

        let id = match input.session_id.as_deref().map(str::trim) {
            Some(session) if !session.is_empty() => format!("commit_summary:{session}"),
            _ => random_id(DocumentType::CommitSummary),
        };
        let mut content = format!("Session Summary:\n\n{}", scrub_secrets(&input.summary));
        if !input.changed_files.is_empty() {
            content.push_str("\n\nChanged files: ");
            content.push_str(&input.changed_files.join(", "));
        }

        let mut doc = Document::new(id, DocumentType::CommitSummary, &input.repository, content);
        doc.metadata = serde_json::json!({ "files": input.changed_files });
        let completion = ctx.initiative.is_some() && detect_completion_signals(&input.summary);
        self.save(doc, &ctx, "memory.save_commit_summary", completion)
    }

    fn context(&self, repository: &str, initiative: Option<&str>) -> Result<WriteContext> {
        if repository.trim().is_empty() {
            return Err(EngramError::InvalidInput("repository is required".to_string()));
        }
        let location = locate_repository(self.store.as_ref(), self.vcs.as_ref(), repository)?;
        let initiative = match initiative.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id_or_name) => Some(self.initiatives.resolve(repository, id_or_name)?),
            None => self.initiatives.focused(repository)?,
        };
        Ok(WriteContext {
            location,
            initiative,
        })
    }

    fn save(
        &self,
        mut doc: Document,
        ctx: &WriteContext,
        operation: &'static str,
        completion_signal: bool,
    ) -> Result<SaveOutcome> {
        doc.branch = Some(ctx.location.branch.clone());
        doc.initiative_id = ctx.initiative.as_ref().map(|i| i.id.clone());

        let embedding = match self.embedder.embed(&doc.content) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(id = %doc.id, "Saving without embedding: {}", e);
                None
            }
        };
        self.store
            .upsert(&doc, embedding.as_deref())
            .map_err(|e| EngramError::store(operation, false, e))?;

        if let Some(initiative) = &ctx.initiative
            && let Err(e) = self.initiatives.touch(initiative)
        {
            tracing::warn!(initiative = %initiative.id, "Failed to record activity: {}", e);
        }

        tracing::info!(
            id = %doc.id,
            doc_type = %doc.doc_type,
            repository = %doc.repository,
            initiative = ?doc.initiative_id,
            "Memory saved"
        );
        Ok(SaveOutcome {
            id: doc.id,
            doc_type: doc.doc_type,
            branch: ctx.location.branch.clone(),
            initiative_id: ctx.initiative.as_ref().map(|i| i.id.clone()),
            initiative_name: ctx.initiative.as_ref().map(|i| i.name.clone()),
            completion_signal,
            prompt: completion_signal.then_some(MARK_COMPLETE_PROMPT),
        })
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EngramError::InvalidInput(format!("{what} must not be empty")));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
