//! Background drain of the capture queue
//!
//! Delivery is at-least-once: a job leaves the queue only after its summary
//! is stored. Summaries are saved under `commit_summary:<session_id>`, so a
//! job processed twice overwrites its own document.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::queue::{CaptureJob, CaptureQueue, QueueError};
use super::summarize::ProviderChain;
use crate::error::EngramError;
use crate::memory::{CommitSummaryInput, MemoryWriter};

/// Counts from one pass over the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub remaining: usize,
}

enum JobOutcome {
    Saved,
    // Finished without a document (empty transcript or unusable job)
    Skipped,
    Retry,
}

pub struct CaptureWorker {
    queue: Arc<CaptureQueue>,
    providers: Arc<ProviderChain>,
    writer: Arc<MemoryWriter>,
    interval: Duration,
    wake: Arc<Notify>,
}

impl CaptureWorker {
    pub fn new(
        queue: Arc<CaptureQueue>,
        providers: Arc<ProviderChain>,
        writer: Arc<MemoryWriter>,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            providers,
            writer,
            interval,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle that triggers an immediate drain
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Process every queued job once
    pub async fn drain(&self) -> Result<DrainReport, QueueError> {
        let jobs = self.queue.pending()?;
        let mut report = DrainReport::default();
        if jobs.is_empty() {
            return Ok(report);
        }
        tracing::info!(jobs = jobs.len(), "Draining capture queue");

        let mut finished = Vec::new();
        for job in jobs {
            match self.process(&job).await {
                JobOutcome::Saved => {
                    report.processed += 1;
                    finished.push(job);
                }
                JobOutcome::Skipped => {
                    report.skipped += 1;
                    finished.push(job);
                }
                JobOutcome::Retry => report.failed += 1,
            }
        }

        self.queue.remove(&finished)?;
        report.remaining = self.queue.len()?;
        tracing::info!(
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            remaining = report.remaining,
            "Capture queue drained"
        );
        Ok(report)
    }

    async fn process(&self, job: &CaptureJob) -> JobOutcome {
        if job.transcript.trim().is_empty() {
            tracing::debug!(session = %job.session_id, "Empty transcript, nothing to summarize");
            return JobOutcome::Skipped;
        }

        let (summary, provider) = match self.providers.summarize(&job.transcript).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(session = %job.session_id, "Summary deferred: {}", e);
                return JobOutcome::Retry;
            }
        };

        let writer = self.writer.clone();
        let input = CommitSummaryInput {
            repository: job.repository.clone(),
            summary,
            changed_files: job.files_edited.clone(),
            session_id: Some(job.session_id.clone()),
            initiative: None,
        };
        let saved = tokio::task::spawn_blocking(move || writer.save_commit_summary(input)).await;

        match saved {
            Ok(Ok(outcome)) => {
                tracing::info!(session = %job.session_id, id = %outcome.id, provider, "Session captured");
                JobOutcome::Saved
            }
            Ok(Err(EngramError::InvalidInput(reason))) => {
                tracing::error!(session = %job.session_id, "Dropping unusable capture job: {}", reason);
                JobOutcome::Skipped
            }
            Ok(Err(e)) => {
                tracing::warn!(session = %job.session_id, "Capture save failed, will retry: {}", e);
                JobOutcome::Retry
            }
            Err(e) => {
                tracing::error!(session = %job.session_id, "Capture task panicked: {}", e);
                JobOutcome::Retry
            }
        }
    }

    /// Run until `shutdown` flips to true
    ///
    /// Wakes on the polling interval or the [`waker`](Self::waker).
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.wake.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                if let Err(e) = self.drain().await {
                    tracing::error!("Capture queue unreadable: {}", e);
                }
            }
            tracing::debug!("Capture worker stopped");
        })
    }
}
