//! Search index abstractions.
//!
//! The [`VectorIndex`] and [`LexicalIndex`] traits are the narrow
//! interfaces through which the pipeline reaches the nearest-neighbor store
//! and the full-text index. Both are consumed as black boxes: the pipeline
//! relies only on the documented hit shapes below.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Passage;

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub passage: Passage,
    /// Similarity in a model-defined range. Higher is more relevant.
    pub score: f64,
}

/// A full-text hit.
///
/// Carries no score: the index's relevance ranking is expressed only by
/// position in the returned list.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub passage: Passage,
    /// Highlighted excerpt, when the index returns one.
    pub highlight: Option<String>,
}

/// An autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub section: String,
    pub preview: String,
}

/// Nearest-neighbor query over passage embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `top_k` hits for `version`, ordered by descending similarity.
    async fn query(&self, vector: &[f32], top_k: usize, version: &str) -> Result<Vec<VectorHit>>;
}

/// Full-text query over passages.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Return up to `limit` hits for `version`, in the index's relevance order.
    async fn search(&self, query: &str, version: &str, limit: usize) -> Result<Vec<LexicalHit>>;

    /// Prefix suggestions for autocomplete.
    async fn suggest(&self, query: &str, version: &str, limit: usize) -> Result<Vec<Suggestion>>;
}
