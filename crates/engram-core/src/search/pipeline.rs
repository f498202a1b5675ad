//! Hybrid search pipeline
//!
//! 1. Semantic and lexical legs run concurrently, each under its own timeout
//! 2. Reciprocal Rank Fusion of the two rank lists
//! 3. Initiative restriction, type multipliers and initiative boost
//! 4. Truncate to `top_k_retrieve`, rerank against the raw query
//! 5. Drop below `min_score`, truncate to `top_k_rerank`
//! 6. Attach staleness to insights and notes
//!
//! Branch and type filters are pushed into both store queries.

use chrono::Utc;
use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::filters::{effective_branches, initiative_boost, matches_initiative};
use super::hybrid::reciprocal_rank_fusion;
use super::reranker::Reranker;
use super::tokenize::query_terms;
use crate::config::EngineConfig;
use crate::embeddings::Embedder;
use crate::error::{EngramError, Result};
use crate::ingest::{locate_repository, VersionControl};
use crate::initiative::Initiative;
use crate::memory::{Document, DocumentType};
use crate::storage::{DocumentFilter, DocumentStore, ScoredHit, Store};
use crate::validation::{staleness_for, StalenessReport};

const QUERY_CACHE_SIZE: usize = 100;

const PREVIEW_CHARS: usize = 300;

// ============================================================================
// REQUEST / RESPONSE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub repository: String,
    /// Overrides the checked-out branch for code and skeleton visibility
    pub branch: Option<String>,
    /// Initiative id or name; boosts its documents
    pub initiative: Option<String>,
    /// Restrict to the initiative instead of boosting
    pub initiative_exclusive: bool,
    pub types: Option<Vec<DocumentType>>,
    pub min_score: Option<f32>,
    pub top_k_retrieve: Option<usize>,
    pub top_k_rerank: Option<usize>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            repository: repository.into(),
            ..Default::default()
        }
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn initiative(mut self, initiative: impl Into<String>, exclusive: bool) -> Self {
        self.initiative = Some(initiative.into());
        self.initiative_exclusive = exclusive;
        self
    }

    pub fn types(mut self, types: Vec<DocumentType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn limits(mut self, top_k_retrieve: usize, top_k_rerank: usize) -> Self {
        self.top_k_retrieve = Some(top_k_retrieve);
        self.top_k_rerank = Some(top_k_rerank);
        self
    }
}

/// Per-stage scores of one hit
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitScores {
    pub semantic: Option<f32>,
    pub lexical: Option<f32>,
    pub fused: f32,
    pub rerank: Option<f32>,
    pub type_multiplier: f32,
    pub initiative_boost: f32,
    #[serde(rename = "final")]
    pub final_score: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub doc_type: DocumentType,
    pub content_preview: String,
    pub path: Option<String>,
    pub branch: Option<String>,
    pub initiative_id: Option<String>,
    pub metadata: serde_json::Value,
    pub scores: HitScores,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness: Option<StalenessReport>,
}

/// Milliseconds spent in each stage
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTiming {
    pub semantic_ms: f64,
    pub lexical_ms: f64,
    pub fusion_ms: f64,
    pub rerank_ms: f64,
    pub total_ms: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StalenessSummary {
    pub annotated: usize,
    pub verification_required_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub repository: String,
    /// Branches code was restricted to; `None` when unfiltered
    pub branches: Option<Vec<String>>,
    pub results: Vec<SearchHit>,
    /// Distinct documents after fusion and initiative filtering
    pub total_candidates: usize,
    pub timing: SearchTiming,
    pub staleness_summary: StalenessSummary,
    /// Degraded legs or stages that did not fail the request
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

// ============================================================================
// LEGS
// ============================================================================

/// Outcome of one retrieval leg; `Degraded` still lets fusion proceed
enum LegOutcome {
    Hits(Vec<ScoredHit>),
    Degraded(String),
}

struct Leg {
    outcome: LegOutcome,
    elapsed_ms: f64,
}

async fn run_leg<F>(name: &'static str, timeout: Duration, work: F) -> Result<Leg>
where
    F: FnOnce() -> Result<LegOutcome> + Send + 'static,
{
    let started = Instant::now();
    let outcome = match tokio::time::timeout(timeout, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join)) => {
            tracing::warn!(leg = name, "Retrieval leg panicked: {}", join);
            LegOutcome::Degraded(format!("{name} leg failed: {join}"))
        }
        Err(_) => {
            tracing::warn!(leg = name, timeout_ms = timeout.as_millis() as u64, "Retrieval leg timed out");
            LegOutcome::Degraded(format!("{name} leg timed out after {}ms", timeout.as_millis()))
        }
    };
    Ok(Leg {
        outcome,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
    })
}

// ============================================================================
// ENGINE
// ============================================================================

/// Tunables for the pipeline
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub top_k_retrieve: usize,
    pub top_k_rerank: usize,
    pub min_score: f32,
    pub rrf_k: f32,
    pub leg_timeout: Duration,
    pub staleness_days: i64,
    pub initiative_boost: f32,
}

impl From<&EngineConfig> for FusionConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            top_k_retrieve: config.top_k_retrieve,
            top_k_rerank: config.top_k_rerank,
            min_score: config.min_score,
            rrf_k: config.rrf_k,
            leg_timeout: config.leg_timeout,
            staleness_days: config.staleness_days,
            initiative_boost: config.initiative_boost,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::with_data_dir("."))
    }
}

struct Candidate {
    document: Document,
    semantic: Option<f32>,
    lexical: Option<f32>,
    fused: f32,
    multiplier: f32,
    boost: f32,
    rerank: Option<f32>,
    score: f32,
}

fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
}

/// Hybrid retrieval over the document store
pub struct FusionEngine {
    store: Arc<dyn Store>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    vcs: Arc<dyn VersionControl>,
    config: FusionConfig,
    query_cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl FusionEngine {
    pub fn new(
        store: Arc<dyn Store>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        vcs: Arc<dyn VersionControl>,
        config: FusionConfig,
    ) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            embedder,
            reranker,
            vcs,
            config,
            query_cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(EngramError::InvalidInput("query must not be empty".to_string()));
        }
        if request.repository.trim().is_empty() {
            return Err(EngramError::InvalidInput("repository is required".to_string()));
        }
        let top_k_retrieve = request.top_k_retrieve.unwrap_or(self.config.top_k_retrieve).max(1);
        let top_k_rerank = request.top_k_rerank.unwrap_or(self.config.top_k_rerank).max(1);
        let min_score = request.min_score.unwrap_or(self.config.min_score);

        let location = locate_repository(self.store.as_ref(), self.vcs.as_ref(), &request.repository)?;
        let branches = effective_branches(request.branch.as_deref(), &location.branch);
        let filter = DocumentFilter {
            repository: Some(request.repository.clone()),
            types: request.types.clone(),
            branches: branches.clone(),
            ..Default::default()
        };

        let (initiative, exclusive) = match request.initiative.as_deref().map(str::trim) {
            Some(id_or_name) if !id_or_name.is_empty() => (
                Some(self.resolve_initiative(&request.repository, id_or_name)?),
                request.initiative_exclusive,
            ),
            _ => (
                self.store
                    .focused_initiative(&request.repository)
                    .map_err(|e| EngramError::store("search.focused_initiative", false, e))?,
                false,
            ),
        };

        // Both legs at once
        let semantic = {
            let store = self.store.clone();
            let embedder = self.embedder.clone();
            let cache = self.query_cache.clone();
            let filter = filter.clone();
            let query = query.clone();
            run_leg("semantic", self.config.leg_timeout, move || {
                let embedding = match cached_embedding(&cache, embedder.as_ref(), &query) {
                    Ok(v) => v,
                    Err(reason) => {
                        tracing::warn!("Semantic leg skipped: {}", reason);
                        return Ok(LegOutcome::Degraded(format!("semantic leg skipped: {reason}")));
                    }
                };
                store
                    .semantic_query(&embedding, &filter, top_k_retrieve)
                    .map(LegOutcome::Hits)
                    .map_err(|e| EngramError::store("search.semantic_query", false, e))
            })
        };
        let lexical = {
            let store = self.store.clone();
            let filter = filter.clone();
            let terms = query_terms(&query);
            run_leg("lexical", self.config.leg_timeout, move || {
                store
                    .lexical_query(&terms, &filter, top_k_retrieve)
                    .map(LegOutcome::Hits)
                    .map_err(|e| EngramError::store("search.lexical_query", false, e))
            })
        };
        let (semantic, lexical) = tokio::join!(semantic, lexical);
        let (semantic, lexical) = (semantic?, lexical?);

        let mut warnings = Vec::new();
        let mut timing = SearchTiming {
            semantic_ms: semantic.elapsed_ms,
            lexical_ms: lexical.elapsed_ms,
            ..Default::default()
        };
        let semantic_hits = leg_hits(semantic.outcome, &mut warnings);
        let lexical_hits = leg_hits(lexical.outcome, &mut warnings);

        // Fusion
        let fusion_started = Instant::now();
        let semantic_ids: Vec<String> = semantic_hits.iter().map(|h| h.document.id.clone()).collect();
        let lexical_ids: Vec<String> = lexical_hits.iter().map(|h| h.document.id.clone()).collect();
        let mut semantic_scores = HashMap::new();
        let mut lexical_scores = HashMap::new();
        let mut documents = HashMap::new();
        for hit in semantic_hits {
            semantic_scores.insert(hit.document.id.clone(), hit.score);
            documents.insert(hit.document.id.clone(), hit.document);
        }
        for hit in lexical_hits {
            lexical_scores.insert(hit.document.id.clone(), hit.score);
            documents.entry(hit.document.id.clone()).or_insert(hit.document);
        }

        let boosted = initiative.as_ref().map(|i| i.id.as_str());
        let mut candidates: Vec<Candidate> = reciprocal_rank_fusion(&semantic_ids, &lexical_ids, self.config.rrf_k)
            .into_iter()
            .filter_map(|fused| {
                let document = documents.remove(&fused.id)?;
                if exclusive && let Some(id) = boosted && !matches_initiative(&document, id) {
                    return None;
                }
                let multiplier = document.doc_type.profile().score_multiplier;
                let boost = initiative_boost(&document, boosted, self.config.initiative_boost);
                Some(Candidate {
                    semantic: semantic_scores.get(&fused.id).copied(),
                    lexical: lexical_scores.get(&fused.id).copied(),
                    score: fused.fused * multiplier * boost,
                    fused: fused.fused,
                    multiplier,
                    boost,
                    rerank: None,
                    document,
                })
            })
            .collect();
        let total_candidates = candidates.len();
        sort_candidates(&mut candidates);
        candidates.truncate(top_k_retrieve);
        timing.fusion_ms = fusion_started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            semantic = semantic_ids.len(),
            lexical = lexical_ids.len(),
            fused = total_candidates,
            "Fused retrieval legs"
        );

        // Rerank
        let rerank_started = Instant::now();
        if !candidates.is_empty() {
            match self.rerank(&query, &candidates).await {
                Ok(scores) => {
                    for (candidate, score) in candidates.iter_mut().zip(scores) {
                        candidate.rerank = Some(score);
                        candidate.score = score * candidate.multiplier * candidate.boost;
                    }
                    sort_candidates(&mut candidates);
                }
                Err(reason) => {
                    tracing::warn!(reranker = self.reranker.name(), "Keeping fused order: {}", reason);
                    warnings.push(format!("rerank skipped: {reason}"));
                }
            }
        }
        candidates.retain(|c| c.score >= min_score);
        candidates.truncate(top_k_rerank);
        timing.rerank_ms = rerank_started.elapsed().as_secs_f64() * 1000.0;

        // Staleness, read-only
        let now = Utc::now();
        let mut summary = StalenessSummary::default();
        let results: Vec<SearchHit> = candidates
            .into_iter()
            .map(|c| {
                let staleness =
                    staleness_for(&c.document, location.root.as_deref(), self.config.staleness_days, now);
                if let Some(report) = &staleness {
                    summary.annotated += 1;
                    if report.verification_required {
                        summary.verification_required_count += 1;
                    }
                }
                SearchHit {
                    content_preview: c.document.preview(PREVIEW_CHARS),
                    id: c.document.id,
                    doc_type: c.document.doc_type,
                    path: c.document.path,
                    branch: c.document.branch,
                    initiative_id: c.document.initiative_id,
                    metadata: c.document.metadata,
                    scores: HitScores {
                        semantic: c.semantic,
                        lexical: c.lexical,
                        fused: c.fused,
                        rerank: c.rerank,
                        type_multiplier: c.multiplier,
                        initiative_boost: c.boost,
                        final_score: c.score,
                    },
                    staleness,
                }
            })
            .collect();

        timing.total_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(
            repository = %request.repository,
            results = results.len(),
            candidates = total_candidates,
            total_ms = timing.total_ms,
            "Search complete"
        );
        Ok(SearchResponse {
            query,
            repository: request.repository,
            branches,
            results,
            total_candidates,
            timing,
            staleness_summary: summary,
            warnings,
        })
    }

    fn resolve_initiative(&self, repository: &str, id_or_name: &str) -> Result<Initiative> {
        let by_id = self
            .store
            .initiative(id_or_name)
            .map_err(|e| EngramError::store("search.initiative", false, e))?
            .filter(|i| i.repository == repository);
        match by_id {
            Some(initiative) => Ok(initiative),
            None => self
                .store
                .initiative_by_name(repository, id_or_name)
                .map_err(|e| EngramError::store("search.initiative", false, e))?
                .ok_or_else(|| EngramError::InitiativeNotFound(id_or_name.to_string())),
        }
    }

    async fn rerank(&self, query: &str, candidates: &[Candidate]) -> std::result::Result<Vec<f32>, String> {
        let reranker = self.reranker.clone();
        let query = query.to_string();
        let contents: Vec<String> = candidates.iter().map(|c| c.document.content.clone()).collect();
        let scores = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
            reranker.score(&query, &refs)
        })
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;
        if scores.len() != candidates.len() {
            return Err(format!(
                "reranker returned {} scores for {} documents",
                scores.len(),
                candidates.len()
            ));
        }
        Ok(scores)
    }
}

fn leg_hits(outcome: LegOutcome, warnings: &mut Vec<String>) -> Vec<ScoredHit> {
    match outcome {
        LegOutcome::Hits(hits) => hits,
        LegOutcome::Degraded(reason) => {
            warnings.push(reason);
            Vec::new()
        }
    }
}

fn cached_embedding(
    cache: &Mutex<LruCache<String, Vec<f32>>>,
    embedder: &dyn Embedder,
    query: &str,
) -> std::result::Result<Vec<f32>, String> {
    if let Ok(mut cache) = cache.lock()
        && let Some(hit) = cache.get(query)
    {
        return Ok(hit.clone());
    }
    let embedding = embedder.embed(query).map_err(|e| e.to_string())?;
    if let Ok(mut cache) = cache.lock() {
        cache.put(query.to_string(), embedding.clone());
    }
    Ok(embedding)
}

// ============================================================================
// TESTS
// ============================================================================
