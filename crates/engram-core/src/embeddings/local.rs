//! Local ONNX embeddings via fastembed
//!
//! The model is loaded lazily on first use and shared process-wide.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

use super::{truncate_text, Embedder, EmbeddingError, MAX_TEXT_LENGTH};

/// Output dimensions of BGE-small
pub const FASTEMBED_DIMENSIONS: usize = 384;

static EMBEDDING_MODEL_RESULT: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

/// Get the default cache directory for fastembed models
/// Uses FASTEMBED_CACHE_PATH env var, or falls back to the engram data directory
fn get_cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return std::path::PathBuf::from(path);
    }
    crate::config::default_data_dir().join("fastembed")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = EMBEDDING_MODEL_RESULT.get_or_init(|| {
        let cache_dir = get_cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(EmbeddingModel::BGESmallENV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("Failed to initialize BGE-small embedding model: {}", e))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

/// Neural embedder backed by a local fastembed model
#[derive(Debug, Default, Clone)]
pub struct FastEmbedder;

impl FastEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Load the model eagerly so the first query does not pay for it
    pub fn warm_up(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }
}

impl Embedder for FastEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }
        let mut model = get_model()?;
        let text = truncate_text(text, MAX_TEXT_LENGTH);
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))
    }

    fn dimensions(&self) -> usize {
        FASTEMBED_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "BAAI/bge-small-en-v1.5"
    }
}
