//! Reranking
//!
//! Second-stage scorers applied to the fused short list:
//! 1. Stage 1: retrieve `top_k_retrieve` candidates via fusion (fast, high recall)
//! 2. Stage 2: score each candidate jointly with the query (slower, high precision)
//!
//! [`TermOverlapReranker`] is a BM25-like term overlap scorer needing no model.
//! [`CrossEncoderReranker`] (feature `embeddings`) wraps fastembed's Jina
//! Reranker v1 Turbo.

#[cfg(feature = "embeddings")]
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
#[cfg(feature = "embeddings")]
use std::sync::Mutex;

use super::tokenize::query_terms;

// ============================================================================
// TYPES
// ============================================================================

/// Reranker error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RerankerError {
    /// Failed to initialize the reranker model
    #[error("Reranker initialization failed: {0}")]
    ModelInit(String),
    /// Failed to rerank
    #[error("Reranking failed: {0}")]
    RerankFailed(String),
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Stateless relevance scorer
///
/// Returns one score per document, in input order. Higher is more relevant.
pub trait Reranker: Send + Sync {
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankerError>;

    fn name(&self) -> &str;
}

// ============================================================================
// TERM OVERLAP
// ============================================================================

/// BM25-inspired term overlap scoring
#[derive(Debug, Clone)]
pub struct TermOverlapReranker {
    k1: f32,
    b: f32,
    avg_doc_len: f32,
}

impl Default for TermOverlapReranker {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            avg_doc_len: 500.0,
        }
    }
}

impl TermOverlapReranker {
    fn relevance(&self, terms: &[String], document: &str) -> f32 {
        let doc_len = document.len() as f32;
        if doc_len == 0.0 || terms.is_empty() {
            return 0.0;
        }
        let doc_lower = document.to_lowercase();

        let mut score = 0.0;
        for term in terms {
            let tf = doc_lower.matches(term.as_str()).count() as f32;
            if tf > 0.0 {
                let numerator = tf * (self.k1 + 1.0);
                let denominator =
                    tf + self.k1 * (1.0 - self.b + self.b * (doc_len / self.avg_doc_len));
                score += numerator / denominator;
            }
        }

        score / terms.len() as f32
    }
}

impl Reranker for TermOverlapReranker {
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankerError> {
        if query.trim().is_empty() {
            return Err(RerankerError::InvalidInput("Query cannot be empty".to_string()));
        }
        let terms = query_terms(query);
        Ok(documents.iter().map(|doc| self.relevance(&terms, doc)).collect())
    }

    fn name(&self) -> &str {
        "term-overlap"
    }
}

// ============================================================================
// CROSS ENCODER
// ============================================================================

/// Neural cross-encoder scorer
///
/// Raw logits are squashed through a sigmoid so scores stay positive and
/// type multipliers keep their meaning.
#[cfg(feature = "embeddings")]
pub struct CrossEncoderReranker {
    model: Mutex<TextRerank>,
}

#[cfg(feature = "embeddings")]
impl CrossEncoderReranker {
    /// Load Jina Reranker v1 Turbo, downloading it on first use
    pub fn try_new() -> Result<Self, RerankerError> {
        let options = RerankInitOptions::new(RerankerModel::JINARerankerV1TurboEn)
            .with_show_download_progress(false);
        let model =
            TextRerank::try_new(options).map_err(|e| RerankerError::ModelInit(e.to_string()))?;
        tracing::info!("Cross-encoder reranker loaded (Jina Reranker v1 Turbo)");
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

#[cfg(feature = "embeddings")]
impl Reranker for CrossEncoderReranker {
    fn score(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, RerankerError> {
        if query.trim().is_empty() {
            return Err(RerankerError::InvalidInput("Query cannot be empty".to_string()));
        }
        if documents.is_empty() {
            return Ok(vec![]);
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| RerankerError::RerankFailed("Model lock poisoned".to_string()))?;
        let results = model
            .rerank(query, documents, false, None)
            .map_err(|e| RerankerError::RerankFailed(e.to_string()))?;

        let mut scores = vec![0.0; documents.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = 1.0 / (1.0 + (-result.score).exp());
            }
        }
        Ok(scores)
    }

    fn name(&self) -> &str {
        "jina-reranker-v1-turbo-en"
    }
}

// ============================================================================
// TESTS
// ============================================================================
