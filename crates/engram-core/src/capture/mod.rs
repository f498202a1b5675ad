//! Deferred session capture
//!
//! Sessions are queued on disk, summarized by a provider chain in the
//! background and stored as commit summaries.

mod queue;
mod summarize;
mod worker;

pub use queue::{truncate_transcript, CaptureJob, CaptureQueue, QueueError, MAX_TRANSCRIPT_CHARS};
pub use summarize::{
    AnthropicProvider, ExtractiveSummarizer, OllamaProvider, ProviderChain, SummarizeError,
    SummaryProvider,
};
pub use worker::{CaptureWorker, DrainReport};
