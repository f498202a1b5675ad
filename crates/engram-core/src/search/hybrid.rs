//! Rank Fusion
//!
//! Combines the lexical (BM25/FTS5) and semantic (embedding) rank lists
//! using Reciprocal Rank Fusion.

use std::collections::HashMap;

// ============================================================================
// FUSION ALGORITHMS
// ============================================================================

/// A fused document with the contributions of each list
#[derive(Debug, Clone, PartialEq)]
pub struct FusedRank {
    pub id: String,
    pub fused: f32,
    /// 1-based rank in the semantic list, if present
    pub semantic_rank: Option<usize>,
    /// 1-based rank in the lexical list, if present
    pub lexical_rank: Option<usize>,
}

/// Reciprocal Rank Fusion for combining search results
///
/// score(d) = sum of 1/(k + rank(d)) over the lists containing d, with
/// 1-based ranks. Documents are ordered by descending score, ties broken by
/// id so identical inputs always produce identical output.
///
/// # Arguments
/// * `semantic_ids` - Semantic results, best first
/// * `lexical_ids` - Lexical results, best first
/// * `k` - Fusion constant (default 60.0)
pub fn reciprocal_rank_fusion(semantic_ids: &[String], lexical_ids: &[String], k: f32) -> Vec<FusedRank> {
    let mut fused: HashMap<&str, FusedRank> = HashMap::new();

    for (idx, id) in semantic_ids.iter().enumerate() {
        let entry = fused.entry(id.as_str()).or_insert_with(|| FusedRank {
            id: id.clone(),
            fused: 0.0,
            semantic_rank: None,
            lexical_rank: None,
        });
        // A duplicate id within one list only counts at its best rank
        if entry.semantic_rank.is_none() {
            entry.semantic_rank = Some(idx + 1);
            entry.fused += 1.0 / (k + (idx + 1) as f32);
        }
    }

    for (idx, id) in lexical_ids.iter().enumerate() {
        let entry = fused.entry(id.as_str()).or_insert_with(|| FusedRank {
            id: id.clone(),
            fused: 0.0,
            semantic_rank: None,
            lexical_rank: None,
        });
        if entry.lexical_rank.is_none() {
            entry.lexical_rank = Some(idx + 1);
            entry.fused += 1.0 / (k + (idx + 1) as f32);
        }
    }

    let mut results: Vec<FusedRank> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.fused
            .partial_cmp(&a.fused)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results
}

// ============================================================================
// TESTS
// ============================================================================
