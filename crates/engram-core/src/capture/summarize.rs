//! Session summarization providers
//!
//! Providers are tried in configured order; the first one that returns
//! non-empty text wins. The extractive provider never touches the network
//! and makes a sensible last resort.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::queue::truncate_transcript;
use crate::config::{EngineConfig, ProviderKind};

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";
const OLLAMA_MODEL: &str = "llama3.2";
const MAX_SUMMARY_TOKENS: u32 = 1500;
const TEMPERATURE: f32 = 0.3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Lines kept by the extractive summarizer
const EXTRACTIVE_MAX_LINES: usize = 12;
const EXTRACTIVE_MAX_LINE_CHARS: usize = 240;

/// Words that mark a transcript line as describing a change or decision
const SIGNAL_WORDS: [&str; 14] = [
    "implement", "add", "fix", "change", "refactor", "remove", "rename", "decide", "because",
    "bug", "error", "todo", "migrat", "test",
];

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("{0} provider is not configured")]
    NotConfigured(&'static str),
    #[error("{provider} request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },
    #[error("{0} returned an empty summary")]
    Empty(&'static str),
    #[error("All summarization providers failed: {0}")]
    Exhausted(String),
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, transcript: &str) -> Result<String, SummarizeError>;
}

fn summary_prompt(transcript: &str) -> String {
    format!(
        "Summarize this coding session transcript for future reference.\n\n\
         Cover what was implemented or changed, why, key design decisions, problems \
         encountered and how they were resolved, non-obvious gotchas, and follow-up work. \
         Write 2-4 concise paragraphs and name specific files where relevant.\n\n\
         Session Transcript:\n---\n{transcript}\n---\n\nSummary:"
    )
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

fn request_error(provider: &'static str, err: impl std::fmt::Display) -> SummarizeError {
    SummarizeError::Request {
        provider,
        message: err.to_string(),
    }
}

// ============================================================================
// ANTHROPIC
// ============================================================================

/// Anthropic Messages API
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            model: ANTHROPIC_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl SummaryProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn summarize(&self, transcript: &str) -> Result<String, SummarizeError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SummarizeError::NotConfigured(self.name()))?;

        let body = json!({
            "model": self.model,
            "max_tokens": MAX_SUMMARY_TOKENS,
            "temperature": TEMPERATURE,
            "messages": [{ "role": "user", "content": summary_prompt(transcript) }],
        });
        let response = self
            .client
            .post(ANTHROPIC_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(request_error(self.name(), format!("HTTP {status}: {text}")));
        }
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| request_error(self.name(), e))?;
        let text = data["content"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");
        non_empty(self.name(), text)
    }
}

// ============================================================================
// OLLAMA
// ============================================================================

/// Local Ollama server
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.into(),
            model: OLLAMA_MODEL.to_string(),
        }
    }
}

#[async_trait]
impl SummaryProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn summarize(&self, transcript: &str) -> Result<String, SummarizeError> {
        let body = json!({
            "model": self.model,
            "prompt": summary_prompt(transcript),
            "stream": false,
            "options": { "temperature": TEMPERATURE, "num_predict": MAX_SUMMARY_TOKENS },
        });
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(self.name(), e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(request_error(self.name(), format!("HTTP {status}")));
        }
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| request_error(self.name(), e))?;
        non_empty(
            self.name(),
            data["response"].as_str().unwrap_or_default().to_string(),
        )
    }
}

fn non_empty(provider: &'static str, text: String) -> Result<String, SummarizeError> {
    let text = text.trim();
    if text.is_empty() {
        Err(SummarizeError::Empty(provider))
    } else {
        Ok(text.to_string())
    }
}

// ============================================================================
// EXTRACTIVE
// ============================================================================

/// Picks the transcript lines that read like changes or decisions
#[derive(Debug, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    fn extract(transcript: &str) -> String {
        let lines: Vec<&str> = transcript
            .lines()
            .map(str::trim)
            .filter(|l| l.len() > 20 && !l.starts_with("```"))
            .collect();

        let mut picked: Vec<&str> = lines
            .iter()
            .copied()
            .filter(|line| {
                let lower = line.to_lowercase();
                SIGNAL_WORDS.iter().any(|w| lower.contains(w))
            })
            .take(EXTRACTIVE_MAX_LINES)
            .collect();
        if picked.is_empty() {
            picked = lines.into_iter().take(EXTRACTIVE_MAX_LINES).collect();
        }

        picked
            .into_iter()
            .map(|line| match line.char_indices().nth(EXTRACTIVE_MAX_LINE_CHARS) {
                Some((cut, _)) => format!("- {}...", &line[..cut]),
                None => format!("- {line}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl SummaryProvider for ExtractiveSummarizer {
    fn name(&self) -> &'static str {
        "extractive"
    }

    async fn summarize(&self, transcript: &str) -> Result<String, SummarizeError> {
        non_empty(self.name(), Self::extract(transcript))
    }
}

// ============================================================================
// CHAIN
// ============================================================================

/// Ordered fallback over several providers
pub struct ProviderChain {
    providers: Vec<Arc<dyn SummaryProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn SummaryProvider>>) -> Self {
        Self { providers }
    }

    /// Build the chain named by `config.providers`
    ///
    /// Anthropic is skipped when no API key is configured.
    pub fn from_config(config: &EngineConfig) -> Self {
        let mut providers: Vec<Arc<dyn SummaryProvider>> = Vec::new();
        for kind in &config.providers {
            match kind {
                ProviderKind::Anthropic => {
                    if config.anthropic_api_key.is_some() {
                        providers.push(Arc::new(AnthropicProvider::new(
                            config.anthropic_api_key.clone(),
                        )));
                    }
                }
                ProviderKind::Ollama => {
                    providers.push(Arc::new(OllamaProvider::new(config.ollama_url.clone())))
                }
                ProviderKind::Extractive => providers.push(Arc::new(ExtractiveSummarizer)),
            }
        }
        Self::new(providers)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Summarize with the first provider that succeeds
    ///
    /// Returns the provider name alongside the text.
    pub async fn summarize(&self, transcript: &str) -> Result<(String, &'static str), SummarizeError> {
        let transcript = truncate_transcript(transcript);
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.summarize(&transcript).await {
                Ok(text) => {
                    tracing::debug!(provider = provider.name(), "Session summarized");
                    return Ok((text, provider.name()));
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), "Summarization failed: {}", e);
                    failures.push(e.to_string());
                }
            }
        }
        if failures.is_empty() {
            failures.push("no providers configured".to_string());
        }
        Err(SummarizeError::Exhausted(failures.join("; ")))
    }
}
