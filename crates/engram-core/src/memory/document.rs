//! Stored documents
//!
//! A flat collection of typed documents. Each type carries declarative
//! retrieval metadata: its score multiplier and whether it is scoped to the
//! branch it was indexed on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// DOCUMENT TYPE
// ============================================================================

/// Kinds of stored documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// A chunk of source code
    Code,
    /// Free-form note or decision
    Note,
    /// Derived understanding linked to specific files
    Insight,
    /// Summary of a session or a set of commits
    CommitSummary,
    /// A tracked unit of multi-session work
    Initiative,
    /// Directory tree of an indexed repository
    Skeleton,
    /// Detected languages and frameworks
    TechStack,
}

/// Retrieval metadata attached to a document type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeProfile {
    /// Multiplier applied to the fused score before truncation
    pub score_multiplier: f32,
    /// Whether documents of this type only match their own branch (or main)
    pub branch_scoped: bool,
}

impl DocumentType {
    /// Every document type
    pub const ALL: [DocumentType; 7] = [
        DocumentType::Code,
        DocumentType::Note,
        DocumentType::Insight,
        DocumentType::CommitSummary,
        DocumentType::Initiative,
        DocumentType::Skeleton,
        DocumentType::TechStack,
    ];

    /// Retrieval profile for this type
    pub const fn profile(self) -> TypeProfile {
        match self {
            DocumentType::Insight => TypeProfile { score_multiplier: 2.0, branch_scoped: false },
            DocumentType::Note => TypeProfile { score_multiplier: 1.5, branch_scoped: false },
            DocumentType::CommitSummary => TypeProfile { score_multiplier: 1.5, branch_scoped: false },
            DocumentType::TechStack => TypeProfile { score_multiplier: 1.2, branch_scoped: false },
            DocumentType::Initiative => TypeProfile { score_multiplier: 1.0, branch_scoped: false },
            DocumentType::Code => TypeProfile { score_multiplier: 1.0, branch_scoped: true },
            DocumentType::Skeleton => TypeProfile { score_multiplier: 1.0, branch_scoped: true },
        }
    }

    /// Types whose documents are filtered by branch
    pub fn branch_scoped_types() -> impl Iterator<Item = DocumentType> {
        Self::ALL.into_iter().filter(|t| t.profile().branch_scoped)
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Code => "code",
            DocumentType::Note => "note",
            DocumentType::Insight => "insight",
            DocumentType::CommitSummary => "commit_summary",
            DocumentType::Initiative => "initiative",
            DocumentType::Skeleton => "skeleton",
            DocumentType::TechStack => "tech_stack",
        }
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(DocumentType::Code),
            "note" | "decision" => Ok(DocumentType::Note),
            "insight" => Ok(DocumentType::Insight),
            "commit_summary" | "session_summary" => Ok(DocumentType::CommitSummary),
            "initiative" => Ok(DocumentType::Initiative),
            "skeleton" => Ok(DocumentType::Skeleton),
            "tech_stack" => Ok(DocumentType::TechStack),
            _ => Err(format!("Unknown document type: {}", s)),
        }
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// A stored document
///
/// `repository` and `branch` are fixed at creation; content changes only
/// through an explicit upsert of the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Stable, type-prefixed key
    pub id: String,
    pub content: String,
    pub doc_type: DocumentType,
    pub repository: String,
    /// Branch the document was written on, if known
    pub branch: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Repository-relative path for code chunks
    pub path: Option<String>,
    /// Initiative this document belongs to
    pub initiative_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Type-specific metadata (chunk scope, insight tracking, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Document {
    /// New document with empty metadata and both timestamps set to now
    pub fn new(
        id: impl Into<String>,
        doc_type: DocumentType,
        repository: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            content: content.into(),
            doc_type,
            repository: repository.into(),
            branch: None,
            tags: Vec::new(),
            path: None,
            initiative_id: None,
            created_at: now,
            updated_at: now,
            metadata: serde_json::Value::Null,
        }
    }

    /// First `max_chars` characters, cut on a char boundary
    pub fn preview(&self, max_chars: usize) -> String {
        match self.content.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &self.content[..idx]),
            None => self.content.clone(),
        }
    }

    /// Typed view of the metadata blob
    pub fn metadata_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.metadata.clone()).ok()
    }
}

/// Scope metadata stored on code chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMeta {
    pub start_line: usize,
    pub end_line: usize,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub scope: Option<String>,
    pub language: String,
    pub chunk_index: usize,
}

// ============================================================================
// IDS
// ============================================================================

/// Deterministic id for the `index`-th chunk of a file
pub fn code_chunk_id(repository: &str, path: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository.as_bytes());
    hasher.update(b"\0");
    hasher.update(path.as_bytes());
    hasher.update(b"\0");
    hasher.update(index.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("code:{}", &digest[..16])
}

/// Fresh random id with the given type prefix
pub fn random_id(doc_type: DocumentType) -> String {
    let simple = uuid::Uuid::new_v4().simple().to_string();
    format!("{}:{}", doc_type.as_str(), &simple[..16])
}
