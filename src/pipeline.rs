//! The hybrid retrieval-and-answer pipeline.
//!
//! ```text
//! search: validate → cache get → (vector ‖ lexical) → fuse → rerank if > k → cache set
//! answer: search(default_k) → gate → low-confidence fallback | generate → citations
//! ```
//!
//! The two retrievers run concurrently and the pipeline waits for both.
//! Only the failure of both fails a search. Rerank and cache failures are
//! recovered where they happen; a generation failure fails the answer.
//!
//! Dropping a pipeline future abandons the in-flight calls. The cache is
//! written only after a complete search result exists.

use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use docs_assistant_core::cache::{search_key, CacheStore, SEARCH_TTL};
use docs_assistant_core::citation::{citations_for, extract_citations};
use docs_assistant_core::error::PipelineError;
use docs_assistant_core::fusion::{fuse, LEXICAL_DEFAULT_SCORE};
use docs_assistant_core::gate::{ConfidenceGate, GateDecision, CONFIDENCE_THRESHOLD};
use docs_assistant_core::generation::{AnswerModel, GenerationRequest};
use docs_assistant_core::index::LexicalIndex;
use docs_assistant_core::models::{
    AnswerMode, AnswerRequest, AnswerResult, Candidate, SearchRequest, SearchResponse, DEFAULT_K,
    DEFAULT_VERSION,
};
use docs_assistant_core::prompt::{low_confidence_answer, synthesis_request, SynthesisSettings};
use docs_assistant_core::rerank::{rerank_candidates, Reranker};
use docs_assistant_core::retrieval::{VectorRetriever, CANDIDATE_K};

use crate::cache::{create_cache, get_or_miss, set_or_log};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::generate::create_answer_model;
use crate::lexical::create_lexical_index;
use crate::rerank::create_reranker;
use crate::vector::create_vector_index;

/// Search request body as received, before defaults are applied.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub k: Option<i64>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Answer request body as received, before defaults are applied.
#[derive(Debug, Clone, Deserialize)]
pub struct AnswerParams {
    pub query: String,
    #[serde(default)]
    pub mode: Option<AnswerMode>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Policy knobs, normally taken from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub candidate_k: usize,
    pub default_k: usize,
    pub max_k: usize,
    pub default_version: String,
    pub lexical_default_score: f64,
    pub confidence_threshold: f64,
    pub context_passages: usize,
    pub fallback_passages: usize,
    pub search_ttl: Duration,
    pub synthesis: SynthesisSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            candidate_k: CANDIDATE_K,
            default_k: DEFAULT_K,
            max_k: 50,
            default_version: DEFAULT_VERSION.to_string(),
            lexical_default_score: LEXICAL_DEFAULT_SCORE,
            confidence_threshold: CONFIDENCE_THRESHOLD,
            context_passages: 6,
            fallback_passages: 4,
            search_ttl: SEARCH_TTL,
            synthesis: SynthesisSettings::default(),
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            candidate_k: config.retrieval.candidate_k,
            default_k: config.retrieval.default_k,
            max_k: config.retrieval.max_k,
            default_version: config.retrieval.default_version.clone(),
            lexical_default_score: config.retrieval.lexical_default_score,
            confidence_threshold: config.answer.confidence_threshold,
            context_passages: config.answer.context_passages,
            fallback_passages: config.answer.fallback_passages,
            search_ttl: config.cache.ttl(),
            synthesis: SynthesisSettings {
                product_name: config.answer.product_name.clone(),
                max_code_blocks: config.answer.max_code_blocks,
                temperature: config.answer.temperature,
                max_tokens: config.answer.max_tokens,
            },
        }
    }
}

/// The external services the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub vector: VectorRetriever,
    pub lexical: Arc<dyn LexicalIndex>,
    pub reranker: Arc<dyn Reranker>,
    pub model: Arc<dyn AnswerModel>,
    pub cache: Arc<dyn CacheStore>,
}

impl Collaborators {
    /// Build every collaborator named in `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            vector: VectorRetriever::new(
                create_embedder(&config.embedding)?,
                create_vector_index(&config.vector)?,
            ),
            lexical: create_lexical_index(&config.lexical)?,
            reranker: create_reranker(&config.rerank)?,
            model: create_answer_model(&config.answer)?,
            cache: create_cache(&config.cache)?,
        })
    }
}

/// What the gate left us to do for an answer request.
enum AnswerPlan {
    Done(AnswerResult),
    Generate {
        request: GenerationRequest,
        context: Vec<Candidate>,
        confidence: f64,
        version: String,
    },
}

#[derive(Clone)]
pub struct Pipeline {
    services: Collaborators,
    settings: PipelineSettings,
    gate: ConfidenceGate,
}

impl Pipeline {
    pub fn new(services: Collaborators, settings: PipelineSettings) -> Self {
        let gate = ConfidenceGate::new(settings.confidence_threshold);
        Self {
            services,
            settings,
            gate,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            Collaborators::from_config(config)?,
            PipelineSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn services(&self) -> &Collaborators {
        &self.services
    }

    /// Apply defaults to a received search body.
    pub fn search_request(&self, params: SearchParams) -> Result<SearchRequest, PipelineError> {
        let k = match params.k {
            None => self.settings.default_k,
            Some(k) => usize::try_from(k).map_err(|_| self.k_out_of_range())?,
        };
        Ok(SearchRequest {
            query: params.query,
            k,
            version: params
                .version
                .unwrap_or_else(|| self.settings.default_version.clone()),
            path: params.path,
        })
    }

    /// Apply defaults to a received answer body.
    pub fn answer_request(&self, params: AnswerParams) -> AnswerRequest {
        AnswerRequest {
            query: params.query,
            mode: params.mode.unwrap_or_default(),
            version: params
                .version
                .unwrap_or_else(|| self.settings.default_version.clone()),
        }
    }

    fn k_out_of_range(&self) -> PipelineError {
        PipelineError::InvalidRequest(format!("k must be between 1 and {}", self.settings.max_k))
    }

    fn validate_search(&self, req: &SearchRequest) -> Result<(), PipelineError> {
        validate_text("query", &req.query)?;
        validate_text("version", &req.version)?;
        if req.k < 1 || req.k > self.settings.max_k {
            return Err(self.k_out_of_range());
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(query = %req.query, k = req.k, version = %req.version))]
    pub async fn search(&self, req: &SearchRequest) -> Result<SearchResponse, PipelineError> {
        self.validate_search(req)?;

        let key = search_key(req);
        if let Some(cached) = get_or_miss(self.services.cache.as_ref(), &key).await {
            match serde_json::from_value::<SearchResponse>(cached) {
                Ok(response) => {
                    tracing::info!(cache_hit = true, passages = response.passages.len(), "search served");
                    return Ok(response);
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry"),
            }
        }

        let response = self.search_uncached(req).await?;

        match serde_json::to_value(&response) {
            Ok(value) => {
                set_or_log(self.services.cache.as_ref(), &key, &value, self.settings.search_ttl).await
            }
            Err(e) => tracing::warn!(error = %e, "search response not cacheable"),
        }
        tracing::info!(cache_hit = false, passages = response.passages.len(), "search served");
        Ok(response)
    }

    async fn search_uncached(&self, req: &SearchRequest) -> Result<SearchResponse, PipelineError> {
        let limit = self.settings.candidate_k;
        let (vector, lexical) = tokio::join!(
            self.services.vector.retrieve(&req.query, &req.version, limit),
            self.services.lexical.search(&req.query, &req.version, limit),
        );

        let (vector_hits, lexical_hits) = match (vector, lexical) {
            (Err(v), Err(l)) => {
                tracing::warn!(vector = %v, lexical = %l, "both retrievers failed");
                return Err(PipelineError::RetrievalFailed {
                    vector: v.to_string(),
                    lexical: l.to_string(),
                });
            }
            (vector, lexical) => (
                vector.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "vector retrieval failed, continuing with lexical hits");
                    Vec::new()
                }),
                lexical.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "lexical retrieval failed, continuing with vector hits");
                    Vec::new()
                }),
            ),
        };

        let vector_count = vector_hits.len();
        let lexical_count = lexical_hits.len();
        let fused = fuse(vector_hits, lexical_hits, self.settings.lexical_default_score);
        tracing::debug!(
            vector = vector_count,
            lexical = lexical_count,
            fused = fused.len(),
            "fused candidates"
        );

        let passages =
            rerank_candidates(self.services.reranker.as_ref(), &req.query, fused, req.k).await;

        Ok(SearchResponse {
            passages,
            query: req.query.clone(),
            version: req.version.clone(),
        })
    }

    async fn plan_answer(&self, req: &AnswerRequest) -> Result<AnswerPlan, PipelineError> {
        validate_text("query", &req.query)?;
        validate_text("version", &req.version)?;

        let search = SearchRequest {
            query: req.query.clone(),
            k: self.settings.default_k,
            version: req.version.clone(),
            path: None,
        };
        let passages = self.search(&search).await?.passages;

        let outcome = self.gate.evaluate(&passages, req.mode);
        tracing::info!(
            confidence = outcome.confidence,
            decision = ?outcome.decision,
            mode = ?req.mode,
            "confidence gate"
        );

        match outcome.decision {
            GateDecision::Fallback => {
                let shown = &passages[..passages.len().min(self.settings.fallback_passages)];
                Ok(AnswerPlan::Done(AnswerResult {
                    answer: low_confidence_answer(shown),
                    citations: citations_for(shown),
                    confidence: outcome.confidence,
                    version: req.version.clone(),
                }))
            }
            GateDecision::Generate => {
                let context: Vec<Candidate> = passages
                    .into_iter()
                    .take(self.settings.context_passages)
                    .collect();
                let request =
                    synthesis_request(&req.query, &req.version, &context, &self.settings.synthesis);
                Ok(AnswerPlan::Generate {
                    request,
                    context,
                    confidence: outcome.confidence,
                    version: req.version.clone(),
                })
            }
        }
    }

    #[tracing::instrument(skip_all, fields(query = %req.query, version = %req.version))]
    pub async fn answer(&self, req: &AnswerRequest) -> Result<AnswerResult, PipelineError> {
        match self.plan_answer(req).await? {
            AnswerPlan::Done(result) => Ok(result),
            AnswerPlan::Generate {
                request,
                context,
                confidence,
                version,
            } => {
                let answer = self
                    .services
                    .model
                    .generate(&request)
                    .await
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;
                Ok(AnswerResult {
                    citations: extract_citations(&answer, &context),
                    answer,
                    confidence,
                    version,
                })
            }
        }
    }

    /// Like [`answer`](Self::answer), but hands each text increment to
    /// `on_delta` as it arrives. A fallback answer arrives as one increment.
    ///
    /// Citations are extracted from the complete text only, since a marker
    /// can be split across increments.
    #[tracing::instrument(skip_all, fields(query = %req.query, version = %req.version))]
    pub async fn answer_streaming<F>(
        &self,
        req: &AnswerRequest,
        mut on_delta: F,
    ) -> Result<AnswerResult, PipelineError>
    where
        F: FnMut(String) + Send,
    {
        match self.plan_answer(req).await? {
            AnswerPlan::Done(result) => {
                on_delta(result.answer.clone());
                Ok(result)
            }
            AnswerPlan::Generate {
                request,
                context,
                confidence,
                version,
            } => {
                let mut stream = self
                    .services
                    .model
                    .stream(&request)
                    .await
                    .map_err(|e| PipelineError::Generation(e.to_string()))?;

                let mut answer = String::new();
                while let Some(piece) = stream.next().await {
                    let piece = piece.map_err(|e| PipelineError::Generation(e.to_string()))?;
                    answer.push_str(&piece);
                    on_delta(piece);
                }

                Ok(AnswerResult {
                    citations: extract_citations(&answer, &context),
                    answer,
                    confidence,
                    version,
                })
            }
        }
    }
}

fn validate_text(field: &str, value: &str) -> Result<(), PipelineError> {
    if value.trim().is_empty() {
        return Err(PipelineError::InvalidRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}
