//! Core data types that flow through the retrieval and answer pipeline.
//!
//! A [`Passage`] is the indexed unit of documentation. Retrievers wrap it
//! into a [`Candidate`] carrying provenance and scores; the pipeline returns
//! [`SearchResponse`]s for searches and [`AnswerResult`]s for answers.

use serde::{Deserialize, Serialize};

/// Documentation release searched when a request does not name one.
pub const DEFAULT_VERSION: &str = "2.3";

/// Number of passages returned when a search request does not set `k`.
pub const DEFAULT_K: usize = 8;

/// Separator used to render a section path for display.
pub const SECTION_SEPARATOR: &str = " > ";

/// A retrievable chunk of documentation.
///
/// `id` is unique within a `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub text: String,
    pub url: String,
    pub title: String,
    /// Headings from the document root down to this passage.
    #[serde(default)]
    pub section_path: Vec<String>,
    pub version: String,
    #[serde(default)]
    pub code_blocks: Vec<String>,
}

impl Passage {
    /// The section path joined for display (`"Commands > Store"`).
    pub fn section(&self) -> String {
        self.section_path.join(SECTION_SEPARATOR)
    }
}

/// Which retriever produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    Vector,
    Lexical,
}

/// A passage annotated with retrieval provenance for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(flatten)]
    pub passage: Passage,
    /// Retrieval score. Vector similarity for vector hits, a fixed default
    /// for lexical-only hits.
    pub score: f64,
    pub source: RetrievalSource,
    /// Cross-encoder relevance, present only after reranking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl Candidate {
    /// The score the confidence gate reads: rerank score when present,
    /// retrieval score otherwise.
    pub fn effective_score(&self) -> f64 {
        self.rerank_score.unwrap_or(self.score)
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub k: usize,
    pub version: String,
    pub path: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            k: DEFAULT_K,
            version: DEFAULT_VERSION.to_string(),
            path: None,
        }
    }
}

/// The cached and returned result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub passages: Vec<Candidate>,
    pub query: String,
    pub version: String,
}

/// Answer mode. `Strict` refuses to generate below the confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    #[default]
    Strict,
    Helpful,
}

impl std::str::FromStr for AnswerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strict" => Ok(AnswerMode::Strict),
            "helpful" => Ok(AnswerMode::Helpful),
            other => Err(format!(
                "unknown answer mode '{}': use strict or helpful",
                other
            )),
        }
    }
}

/// A validated answer request.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRequest {
    pub query: String,
    pub mode: AnswerMode,
    pub version: String,
}

/// A bound reference from generated text to a source passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based position; matches the `[n]` marker in the answer text.
    pub id: usize,
    pub url: String,
    pub title: String,
    pub section: String,
    pub snippet: String,
}

/// The result of an answer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub citations: Vec<Citation>,
    /// Mean effective score of the top passages, as seen by the gate.
    pub confidence: f64,
    pub version: String,
}
