//! Memory Module
//!
//! Document types stored by the engine and the write paths that create
//! notes, insights, and commit summaries.

mod document;
mod insight;
mod writer;

pub use document::{code_chunk_id, random_id, ChunkMeta, Document, DocumentType, TypeProfile};
pub use insight::{InsightMeta, InsightStatus, ValidationOutcome, ValidationRecord};
pub use writer::{
    CommitSummaryInput, InsightInput, MemoryWriter, NoteInput, SaveOutcome, MARK_COMPLETE_PROMPT,
};
