//! Storage Module
//!
//! SQLite-backed document store with:
//! - FTS5 lexical index over identifier-split tokens
//! - Embedding blobs for brute-force cosine retrieval
//! - File records owned by delta sync
//! - Initiative persistence
//! - Versioned migrations with backup and rollback

mod backup;
mod migrations;
mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::initiative::{Initiative, InitiativeStatus};
use crate::memory::{Document, DocumentType};

pub use backup::{backup_to, cleanup_old_backups, restore_from, BACKUPS_TO_KEEP};
pub use migrations::{
    current_version, schema_version, AppliedMigration, Migration, MigrationError,
    MigrationReport, MigrationRunner, MigrationStatus, SchemaVersion, MIGRATIONS,
};
pub use sqlite::{Result, Storage, StorageError};

// ============================================================================
// RECORDS
// ============================================================================

/// One indexed file; at most one per (repository, path)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub repository: String,
    pub path: String,
    pub content_hash: String,
    pub indexed_at: DateTime<Utc>,
    pub branch: String,
}

/// Known repository and where it lives on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    pub name: String,
    pub root_path: PathBuf,
    pub updated_at: DateTime<Utc>,
}

/// A document returned by a retrieval leg with its raw leg score
#[derive(Debug, Clone)]
pub struct ScoredHit {
    pub document: Document,
    pub score: f32,
}

// ============================================================================
// FILTER
// ============================================================================

/// Metadata filter applied inside store queries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    pub repository: Option<String>,
    pub types: Option<Vec<DocumentType>>,
    pub path: Option<String>,
    pub initiative_id: Option<String>,
    /// Documents of branch-scoped types must be on one of these branches
    pub branches: Option<Vec<String>>,
}

impl DocumentFilter {
    /// Filter matching everything in one repository
    pub fn repository(repository: impl Into<String>) -> Self {
        Self {
            repository: Some(repository.into()),
            ..Default::default()
        }
    }

    pub fn with_types(mut self, types: Vec<DocumentType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_branches(mut self, branches: Vec<String>) -> Self {
        self.branches = Some(branches);
        self
    }

    /// Evaluate the filter against an in-memory document
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(repo) = &self.repository
            && &doc.repository != repo
        {
            return false;
        }
        if let Some(types) = &self.types
            && !types.contains(&doc.doc_type)
        {
            return false;
        }
        if let Some(path) = &self.path
            && doc.path.as_deref() != Some(path.as_str())
        {
            return false;
        }
        if let Some(initiative) = &self.initiative_id
            && doc.initiative_id.as_deref() != Some(initiative.as_str())
        {
            return false;
        }
        if let Some(branches) = &self.branches
            && doc.doc_type.profile().branch_scoped
        {
            return doc
                .branch
                .as_ref()
                .is_some_and(|b| branches.iter().any(|allowed| allowed == b));
        }
        true
    }

    /// SQL predicate over the `documents` table aliased as `alias`
    pub(crate) fn to_sql(&self, alias: &str) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(repo) = &self.repository {
            clauses.push(format!("{alias}.repository = ?"));
            params.push(repo.clone());
        }
        if let Some(types) = &self.types {
            if types.is_empty() {
                clauses.push("0".to_string());
            } else {
                clauses.push(format!("{alias}.doc_type IN ({})", placeholders(types.len())));
                params.extend(types.iter().map(|t| t.as_str().to_string()));
            }
        }
        if let Some(path) = &self.path {
            clauses.push(format!("{alias}.path = ?"));
            params.push(path.clone());
        }
        if let Some(initiative) = &self.initiative_id {
            clauses.push(format!("{alias}.initiative_id = ?"));
            params.push(initiative.clone());
        }
        if let Some(branches) = &self.branches {
            let scoped: Vec<String> = DocumentType::branch_scoped_types()
                .map(|t| t.as_str().to_string())
                .collect();
            if !scoped.is_empty() {
                if branches.is_empty() {
                    clauses.push(format!(
                        "{alias}.doc_type NOT IN ({})",
                        placeholders(scoped.len())
                    ));
                    params.extend(scoped);
                } else {
                    clauses.push(format!(
                        "({alias}.doc_type NOT IN ({}) OR {alias}.branch IN ({}))",
                        placeholders(scoped.len()),
                        placeholders(branches.len())
                    ));
                    params.extend(scoped);
                    params.extend(branches.iter().cloned());
                }
            }
        }

        if clauses.is_empty() {
            ("1".to_string(), params)
        } else {
            (clauses.join(" AND "), params)
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Generic CRUD plus filtered retrieval over the document collection
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document; `repository`, `branch` and `created_at`
    /// of an existing id are never overwritten
    fn upsert(&self, doc: &Document, embedding: Option<&[f32]>) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Document>>;

    /// Replace metadata and bump `updated_at`, leaving content, index
    /// tokens and embedding untouched. Returns false for an unknown id.
    fn update_metadata(&self, id: &str, metadata: &serde_json::Value) -> Result<bool>;

    /// Returns true if a document was removed
    fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every match, returning how many were removed
    fn delete_where(&self, filter: &DocumentFilter) -> Result<usize>;

    /// Matching documents ordered by id
    fn find(&self, filter: &DocumentFilter, limit: usize) -> Result<Vec<Document>>;

    fn count(&self, filter: &DocumentFilter) -> Result<usize>;

    /// Embedding similarity, best first
    fn semantic_query(
        &self,
        embedding: &[f32],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredHit>>;

    /// Term-frequency scoring over tokenized content, best first
    fn lexical_query(
        &self,
        terms: &[String],
        filter: &DocumentFilter,
        limit: usize,
    ) -> Result<Vec<ScoredHit>>;

    fn upsert_file_record(&self, record: &FileRecord) -> Result<()>;
    fn file_record(&self, repository: &str, path: &str) -> Result<Option<FileRecord>>;
    fn file_records(&self, repository: &str) -> Result<Vec<FileRecord>>;
    fn delete_file_record(&self, repository: &str, path: &str) -> Result<bool>;

    fn register_repository(&self, name: &str, root_path: &std::path::Path) -> Result<()>;
    fn repository(&self, name: &str) -> Result<Option<RepositoryRecord>>;
}

/// Persistence for the initiative state machine
pub trait InitiativeStore: Send + Sync {
    fn insert_initiative(&self, initiative: &Initiative) -> Result<()>;
    fn update_initiative(&self, initiative: &Initiative) -> Result<()>;
    fn initiative(&self, id: &str) -> Result<Option<Initiative>>;
    fn initiative_by_name(&self, repository: &str, name: &str) -> Result<Option<Initiative>>;
    fn initiatives(
        &self,
        repository: &str,
        status: Option<InitiativeStatus>,
    ) -> Result<Vec<Initiative>>;
    fn focused_initiative(&self, repository: &str) -> Result<Option<Initiative>>;
    /// Atomically focus `id` and unfocus every other initiative of the repository
    fn set_focus(&self, repository: &str, id: &str) -> Result<()>;
}

/// Everything the engine components need from persistence
pub trait Store: DocumentStore + InitiativeStore {}

impl<T: DocumentStore + InitiativeStore> Store for T {}
