//! Feature-hashing embedder
//!
//! Projects identifier tokens and character trigrams into a fixed number of
//! signed buckets. Deterministic across runs and platforms, needs no model.

use super::{truncate_text, Embedder, EmbeddingError, MAX_TEXT_LENGTH};
use crate::search::tokenize_code;

/// Default vector length
pub const HASHING_DIMENSIONS: usize = 256;

/// Trigram features count for less than whole tokens
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic bag-of-features embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(HASHING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }
        let text = truncate_text(text, MAX_TEXT_LENGTH);
        let mut vector = vec![0.0_f32; self.dimensions];

        for token in tokenize_code(text) {
            self.add_feature(&mut vector, &token, 1.0);
            let chars: Vec<char> = token.chars().collect();
            if chars.len() > 3 {
                for window in chars.windows(3) {
                    let trigram: String = window.iter().collect();
                    self.add_feature(&mut vector, &format!("#{trigram}"), TRIGRAM_WEIGHT);
                }
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
