//! Search Module
//!
//! Hybrid retrieval over the document store:
//! - Code-aware tokenization shared with the lexical index
//! - Reciprocal Rank Fusion of semantic and lexical legs
//! - Branch-aware visibility and initiative boosting
//! - Second-stage reranking
//! - Concurrent, individually time-boxed retrieval legs

mod filters;
mod hybrid;
mod pipeline;
mod reranker;
mod tokenize;

pub use filters::{effective_branches, initiative_boost, matches_initiative, TRUNK_BRANCH};
pub use hybrid::{reciprocal_rank_fusion, FusedRank};
pub use pipeline::{
    FusionConfig, FusionEngine, HitScores, SearchHit, SearchRequest, SearchResponse,
    SearchTiming, StalenessSummary,
};
#[cfg(feature = "embeddings")]
pub use reranker::CrossEncoderReranker;
pub use reranker::{Reranker, RerankerError, TermOverlapReranker};
pub use tokenize::{query_terms, tokenize_code};
