//! Branch and initiative filtering

use crate::ingest::UNKNOWN_BRANCH;
use crate::memory::{Document, DocumentType};

/// Trunk branch whose code is visible from every other branch
pub const TRUNK_BRANCH: &str = "main";

/// Types that belong to the whole repository when untagged, so an
/// exclusive initiative filter keeps them
const REPOSITORY_WIDE_TYPES: [DocumentType; 2] = [DocumentType::Skeleton, DocumentType::TechStack];

/// Branches whose code and skeleton documents are visible
///
/// An explicit `requested` branch replaces the checked-out one. Trunk is
/// always added. `None` means no branch filter: the branch is unknown.
pub fn effective_branches(requested: Option<&str>, current: &str) -> Option<Vec<String>> {
    let branch = requested
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(current);
    if branch == UNKNOWN_BRANCH {
        return None;
    }
    let mut branches = vec![branch.to_string()];
    if branch != TRUNK_BRANCH && branch != "master" {
        branches.push(TRUNK_BRANCH.to_string());
    }
    Some(branches)
}

/// Whether `doc` survives an exclusive filter on `initiative_id`
pub fn matches_initiative(doc: &Document, initiative_id: &str) -> bool {
    match doc.initiative_id.as_deref() {
        Some(tagged) => tagged == initiative_id,
        None => REPOSITORY_WIDE_TYPES.contains(&doc.doc_type),
    }
}

/// Multiplier for documents tagged with the boosted initiative
pub fn initiative_boost(doc: &Document, initiative_id: Option<&str>, factor: f32) -> f32 {
    match (initiative_id, doc.initiative_id.as_deref()) {
        (Some(target), Some(tagged)) if target == tagged => factor,
        _ => 1.0,
    }
}
