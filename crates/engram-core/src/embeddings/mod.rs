//! Semantic Embeddings Module
//!
//! The [`Embedder`] seam used by ingestion and retrieval:
//! - [`HashingEmbedder`]: deterministic feature hashing over code tokens (default)
//! - [`FastEmbedder`]: local ONNX inference via fastembed (`embeddings` feature)
//!
//! Vectors are stored as little-endian f32 blobs and compared by cosine similarity.

mod hashing;
#[cfg(feature = "embeddings")]
mod local;

pub use hashing::HashingEmbedder;
#[cfg(feature = "embeddings")]
pub use local::FastEmbedder;

/// Maximum text length for embedding (truncated if longer)
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty, too long, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// EMBEDDER
// ============================================================================

/// Produces fixed-length vectors for text
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this embedder returns
    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

// ============================================================================
// VECTOR HELPERS
// ============================================================================

/// Encode as little-endian f32 bytes
pub fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes; a trailing partial value is ignored
pub fn vector_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in [-1, 1]; 0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot_product += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator > 0.0 {
        dot_product / denominator
    } else {
        0.0
    }
}

/// Longest prefix of `text` within `max_bytes`, cut on a char boundary
pub(crate) fn truncate_text(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
