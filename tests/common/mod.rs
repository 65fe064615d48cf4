//! Scripted collaborators shared by the integration tests.
//!
//! Each fake counts its calls so tests can assert which services a request
//! actually reached.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docs_assistant::cache::{CacheStore, InMemoryCache, NoopCache};
use docs_assistant::pipeline::{Collaborators, Pipeline, PipelineSettings};
use docs_assistant_core::embedding::Embedder;
use docs_assistant_core::generation::{AnswerModel, GenerationRequest, TextStream};
use docs_assistant_core::index::{LexicalHit, LexicalIndex, Suggestion, VectorHit, VectorIndex};
use docs_assistant_core::models::Passage;
use docs_assistant_core::rerank::{RerankScore, Reranker};
use docs_assistant_core::retrieval::VectorRetriever;

pub fn passage(id: &str) -> Passage {
    Passage {
        id: id.to_string(),
        text: format!("The {} keyword does something useful.", id),
        url: format!("https://help.example/2.3/{}", id),
        title: id.to_string(),
        section_path: vec!["Commands".to_string(), id.to_string()],
        version: "2.3".to_string(),
        code_blocks: Vec::new(),
    }
}

// ─── Embedder ───────────────────────────────────────────────────────

pub struct UnitEmbedder;

#[async_trait]
impl Embedder for UnitEmbedder {
    fn model_name(&self) -> &str {
        "unit"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

// ─── Retrievers ─────────────────────────────────────────────────────

/// Returns the same scored hits for every query, or fails.
pub struct ScriptedVector {
    hits: Option<Vec<(String, f64)>>,
    failure: String,
    pub calls: AtomicUsize,
}

impl ScriptedVector {
    pub fn new(hits: &[(&str, f64)]) -> Self {
        Self {
            hits: Some(hits.iter().map(|(id, s)| (id.to_string(), *s)).collect()),
            failure: String::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::failing_with("vector store unavailable")
    }

    pub fn failing_with(message: &str) -> Self {
        Self {
            hits: None,
            failure: message.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for ScriptedVector {
    async fn query(&self, _vector: &[f32], top_k: usize, _version: &str) -> Result<Vec<VectorHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.hits {
            Some(hits) => Ok(hits
                .iter()
                .take(top_k)
                .map(|(id, score)| VectorHit {
                    passage: passage(id),
                    score: *score,
                })
                .collect()),
            None => bail!("{}", self.failure),
        }
    }
}

pub struct ScriptedLexical {
    ids: Option<Vec<String>>,
    failure: String,
    suggestions: Vec<Suggestion>,
    pub calls: AtomicUsize,
}

impl ScriptedLexical {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: Some(ids.iter().map(|s| s.to_string()).collect()),
            failure: String::new(),
            suggestions: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self::failing_with("search index unavailable")
    }

    pub fn failing_with(message: &str) -> Self {
        Self {
            ids: None,
            failure: message.to_string(),
            suggestions: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_suggestions(mut self, titles: &[&str]) -> Self {
        self.suggestions = titles
            .iter()
            .map(|t| Suggestion {
                text: t.to_string(),
                section: "Commands".to_string(),
                preview: format!("{} keyword", t),
            })
            .collect();
        self
    }
}

#[async_trait]
impl LexicalIndex for ScriptedLexical {
    async fn search(&self, _query: &str, _version: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.ids {
            Some(ids) => Ok(ids
                .iter()
                .take(limit)
                .map(|id| LexicalHit {
                    passage: passage(id),
                    highlight: None,
                })
                .collect()),
            None => bail!("{}", self.failure),
        }
    }

    async fn suggest(&self, _query: &str, _version: &str, limit: usize) -> Result<Vec<Suggestion>> {
        if self.ids.is_none() {
            bail!("{}", self.failure);
        }
        Ok(self.suggestions.iter().take(limit).cloned().collect())
    }
}

// ─── Reranker ───────────────────────────────────────────────────────

pub struct ScriptedReranker {
    scores: Option<Vec<RerankScore>>,
    pub calls: AtomicUsize,
}

impl ScriptedReranker {
    pub fn new(scores: &[(usize, f64)]) -> Self {
        Self {
            scores: Some(
                scores
                    .iter()
                    .map(|(index, relevance_score)| RerankScore {
                        index: *index,
                        relevance_score: *relevance_score,
                    })
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            scores: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Reranker for ScriptedReranker {
    fn model_name(&self) -> &str {
        "scripted-rerank"
    }

    async fn rerank(&self, _query: &str, _documents: &[String], _top_n: usize) -> Result<Vec<RerankScore>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.scores {
            Some(scores) => Ok(scores.clone()),
            None => bail!("rerank service timed out"),
        }
    }
}

// ─── Answer model ───────────────────────────────────────────────────

/// Replies with fixed increments and records the last request it saw.
/// A failing model errors on `generate` and after the last streamed piece.
pub struct ScriptedModel {
    pieces: Vec<String>,
    failure: Option<String>,
    pub calls: AtomicUsize,
    pub last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedModel {
    pub fn new(pieces: &[&str]) -> Self {
        Self {
            pieces: pieces.iter().map(|s| s.to_string()).collect(),
            failure: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing_with(pieces: &[&str], message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(pieces)
        }
    }

    fn record(&self, request: &GenerationRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
    }
}

#[async_trait]
impl AnswerModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted-chat"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.record(request);
        if let Some(message) = &self.failure {
            bail!("{}", message);
        }
        Ok(self.pieces.concat())
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream> {
        self.record(request);
        let mut pieces: Vec<Result<String>> = self.pieces.iter().cloned().map(Ok).collect();
        if let Some(message) = &self.failure {
            pieces.push(Err(anyhow!("{}", message)));
        }
        Ok(stream::iter(pieces).boxed())
    }
}

// ─── Assembly ───────────────────────────────────────────────────────

pub struct Fakes {
    pub vector: Arc<ScriptedVector>,
    pub lexical: Arc<ScriptedLexical>,
    pub reranker: Arc<ScriptedReranker>,
    pub model: Arc<ScriptedModel>,
    pub cache: Arc<dyn CacheStore>,
}

impl Fakes {
    pub fn new(vector: ScriptedVector, lexical: ScriptedLexical) -> Self {
        Self {
            vector: Arc::new(vector),
            lexical: Arc::new(lexical),
            reranker: Arc::new(ScriptedReranker::failing()),
            model: Arc::new(ScriptedModel::new(&["Use Store [1]."])),
            cache: Arc::new(NoopCache),
        }
    }

    pub fn with_reranker(mut self, reranker: ScriptedReranker) -> Self {
        self.reranker = Arc::new(reranker);
        self
    }

    pub fn with_model(mut self, model: ScriptedModel) -> Self {
        self.model = Arc::new(model);
        self
    }

    pub fn with_memory_cache(mut self) -> Self {
        self.cache = Arc::new(InMemoryCache::default());
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            vector: VectorRetriever::new(Arc::new(UnitEmbedder), self.vector.clone()),
            lexical: self.lexical.clone(),
            reranker: self.reranker.clone(),
            model: self.model.clone(),
            cache: self.cache.clone(),
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.collaborators(), PipelineSettings::default())
    }
}
