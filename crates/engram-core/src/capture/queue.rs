//! Persisted capture queue
//!
//! The queue is a JSON array rewritten through a temp file and rename on
//! every change, so a crash never leaves a torn file behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::ingest::write_atomic;

/// Transcripts longer than this are cut before summarization
pub const MAX_TRANSCRIPT_CHARS: usize = 100_000;

const TRUNCATION_MARKER: &str = "\n\n[... transcript truncated ...]";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Capture queue IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Capture queue is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Invalid capture job: {0}")]
    InvalidJob(String),
}

/// A session waiting to be summarized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureJob {
    pub session_id: String,
    pub repository: String,
    pub transcript: String,
    #[serde(default)]
    pub files_edited: Vec<String>,
    pub queued_at: DateTime<Utc>,
}

impl CaptureJob {
    pub fn new(
        session_id: impl Into<String>,
        repository: impl Into<String>,
        transcript: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            repository: repository.into(),
            transcript: transcript.into(),
            files_edited: Vec::new(),
            queued_at: Utc::now(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_edited = files;
        self
    }
}

/// Cut `transcript` to at most [`MAX_TRANSCRIPT_CHARS`] characters
pub fn truncate_transcript(transcript: &str) -> String {
    match transcript.char_indices().nth(MAX_TRANSCRIPT_CHARS) {
        Some((cut, _)) => format!("{}{}", &transcript[..cut], TRUNCATION_MARKER),
        None => transcript.to_string(),
    }
}

/// File-backed queue shared by the enqueue path and the worker
pub struct CaptureQueue {
    path: PathBuf,
    // Serializes read-modify-write cycles within the process
    guard: Mutex<()>,
}

impl CaptureQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a job, replacing any queued job with the same session id
    pub fn enqueue(&self, job: CaptureJob) -> Result<usize, QueueError> {
        if job.session_id.trim().is_empty() {
            return Err(QueueError::InvalidJob("session_id is required".to_string()));
        }
        if job.repository.trim().is_empty() {
            return Err(QueueError::InvalidJob("repository is required".to_string()));
        }
        let _lock = self.lock();
        let mut jobs = self.read()?;
        jobs.retain(|j| j.session_id != job.session_id);
        tracing::debug!(session = %job.session_id, repository = %job.repository, "Capture queued");
        jobs.push(job);
        self.write(&jobs)?;
        Ok(jobs.len())
    }

    /// Snapshot of queued jobs, oldest first
    pub fn pending(&self) -> Result<Vec<CaptureJob>, QueueError> {
        let _lock = self.lock();
        self.read()
    }

    /// Drop jobs the worker finished
    ///
    /// Only the exact snapshot entries go: a session requeued while its
    /// earlier transcript was being summarized stays queued.
    pub fn remove(&self, finished: &[CaptureJob]) -> Result<usize, QueueError> {
        if finished.is_empty() {
            return Ok(0);
        }
        let _lock = self.lock();
        let mut jobs = self.read()?;
        let before = jobs.len();
        jobs.retain(|j| {
            !finished
                .iter()
                .any(|done| done.session_id == j.session_id && done.queued_at == j.queued_at)
        });
        let removed = before - jobs.len();
        if removed > 0 {
            self.write(&jobs)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> Result<usize, QueueError> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self) -> Result<Vec<CaptureJob>, QueueError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, jobs: &[CaptureJob]) -> Result<(), QueueError> {
        let bytes = serde_json::to_vec_pretty(jobs)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}
