//! Engine Configuration
//!
//! Defaults tuned for a single-user daemon, overridable through `ENGRAM_*`
//! environment variables.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default number of candidates each retrieval leg returns
pub const DEFAULT_TOP_K_RETRIEVE: usize = 50;

/// Default number of results returned after reranking
pub const DEFAULT_TOP_K_RERANK: usize = 5;

/// RRF fusion constant
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Insights unverified for longer than this are `possibly_stale`
pub const DEFAULT_STALENESS_DAYS: i64 = 30;

/// Focused initiatives idle longer than this trigger an orientation prompt
pub const DEFAULT_INITIATIVE_STALE_DAYS: i64 = 5;

/// Score multiplier for documents tagged with the requested initiative
pub const DEFAULT_INITIATIVE_BOOST: f32 = 1.3;

/// Per-leg retrieval timeout
pub const DEFAULT_LEG_TIMEOUT_MS: u64 = 2_000;

/// Capture queue polling interval
pub const DEFAULT_QUEUE_INTERVAL_SECS: u64 = 5;

/// Default Ollama endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

// ============================================================================
// CONFIG
// ============================================================================

/// Summarization backends, tried in the configured order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    Ollama,
    Extractive,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            "extractive" => Ok(ProviderKind::Extractive),
            other => Err(format!("Unknown summarization provider: {}", other)),
        }
    }
}

/// Engine configuration shared by every component
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of all persisted state (database, backups, sync state, queue)
    pub data_dir: PathBuf,
    /// Candidates per retrieval leg, and the pre-rerank truncation point
    pub top_k_retrieve: usize,
    /// Results returned after reranking
    pub top_k_rerank: usize,
    /// Results scoring below this are dropped after reranking
    pub min_score: f32,
    /// RRF constant
    pub rrf_k: f32,
    /// Timeout applied to each retrieval leg independently
    pub leg_timeout: Duration,
    /// Insight freshness window in days
    pub staleness_days: i64,
    /// Initiative inactivity window in days
    pub initiative_stale_days: i64,
    /// Boost applied to documents of the requested initiative
    pub initiative_boost: f32,
    /// Ordered summarization fallback chain
    pub providers: Vec<ProviderKind>,
    /// Anthropic credentials, when that provider is enabled
    pub anthropic_api_key: Option<String>,
    /// Ollama base URL
    pub ollama_url: String,
    /// Capture queue polling interval
    pub queue_interval: Duration,
}

impl EngineConfig {
    /// Defaults rooted at the given data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            top_k_retrieve: DEFAULT_TOP_K_RETRIEVE,
            top_k_rerank: DEFAULT_TOP_K_RERANK,
            min_score: 0.0,
            rrf_k: DEFAULT_RRF_K,
            leg_timeout: Duration::from_millis(DEFAULT_LEG_TIMEOUT_MS),
            staleness_days: DEFAULT_STALENESS_DAYS,
            initiative_stale_days: DEFAULT_INITIATIVE_STALE_DAYS,
            initiative_boost: DEFAULT_INITIATIVE_BOOST,
            providers: vec![ProviderKind::Anthropic, ProviderKind::Ollama, ProviderKind::Extractive],
            anthropic_api_key: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            queue_interval: Duration::from_secs(DEFAULT_QUEUE_INTERVAL_SECS),
        }
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("ENGRAM_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let mut config = Self::with_data_dir(data_dir);

        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());

        if let Some(v) = parse("ENGRAM_TOP_K_RETRIEVE").filter(|v| *v >= 1.0) {
            config.top_k_retrieve = v as usize;
        }
        if let Some(v) = parse("ENGRAM_TOP_K_RERANK").filter(|v| *v >= 1.0) {
            config.top_k_rerank = v as usize;
        }
        if let Some(v) = parse("ENGRAM_MIN_SCORE") {
            config.min_score = v as f32;
        }
        if let Some(v) = parse("ENGRAM_RRF_K").filter(|v| *v > 0.0) {
            config.rrf_k = v as f32;
        }
        if let Some(v) = parse("ENGRAM_LEG_TIMEOUT_MS").filter(|v| *v >= 1.0) {
            config.leg_timeout = Duration::from_millis(v as u64);
        }
        if let Some(v) = parse("ENGRAM_STALENESS_DAYS").filter(|v| *v >= 1.0) {
            config.staleness_days = v as i64;
        }
        if let Some(v) = parse("ENGRAM_INITIATIVE_STALE_DAYS").filter(|v| *v >= 1.0) {
            config.initiative_stale_days = v as i64;
        }
        if let Some(v) = parse("ENGRAM_INITIATIVE_BOOST").filter(|v| *v >= 1.0) {
            config.initiative_boost = v as f32;
        }
        if let Some(v) = parse("ENGRAM_QUEUE_INTERVAL_SECS").filter(|v| *v >= 1.0) {
            config.queue_interval = Duration::from_secs(v as u64);
        }
        if let Some(list) = lookup("ENGRAM_LLM_PROVIDERS") {
            let providers: Vec<ProviderKind> = list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .filter_map(|s| match s.parse() {
                    Ok(kind) => Some(kind),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        None
                    }
                })
                .collect();
            if !providers.is_empty() {
                config.providers = providers;
            }
        }
        config.anthropic_api_key = lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(url) = lookup("ENGRAM_OLLAMA_URL").filter(|u| !u.trim().is_empty()) {
            config.ollama_url = url.trim_end_matches('/').to_string();
        }

        config
    }

    /// SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("engram.db")
    }

    /// Directory holding one sync state file per repository
    pub fn sync_dir(&self) -> PathBuf {
        self.data_dir.join("sync")
    }

    /// Persisted capture queue
    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join("capture_queue.json")
    }

    /// Global ignore file merged into every ingestion
    pub fn global_ignore_path(&self) -> PathBuf {
        self.data_dir.join("engramignore")
    }
}

/// Platform data directory, or `./.engram` when none can be determined
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("dev", "engram", "engram")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

// ============================================================================
// TESTS
// ============================================================================
