//! In-memory [`VectorIndex`] and [`LexicalIndex`] for tests and offline use.
//!
//! Uses a `Vec` behind `std::sync::RwLock` for thread safety. Vector search
//! is brute-force cosine similarity over every stored vector; keyword search
//! ranks by the number of query terms a passage contains.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::citation::truncate_with_ellipsis;
use crate::embedding::cosine_similarity;
use crate::models::Passage;

use super::{LexicalHit, LexicalIndex, Suggestion, VectorHit, VectorIndex};

/// Characters of passage text shown in a suggestion preview.
const PREVIEW_CHARS: usize = 100;

struct StoredPassage {
    passage: Passage,
    vector: Option<Vec<f32>>,
}

/// In-memory passage index.
pub struct InMemoryIndex {
    passages: RwLock<Vec<StoredPassage>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
        }
    }

    /// Insert or replace a passage (keyed by `id` and `version`).
    pub fn upsert(&self, passage: Passage, vector: Option<Vec<f32>>) {
        let mut stored = self.passages.write().unwrap_or_else(|e| e.into_inner());
        stored.retain(|sp| !(sp.passage.id == passage.id && sp.passage.version == passage.version));
        stored.push(StoredPassage { passage, vector });
    }

    pub fn len(&self) -> usize {
        self.passages.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn query(&self, vector: &[f32], top_k: usize, version: &str) -> Result<Vec<VectorHit>> {
        let stored = self.passages.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<VectorHit> = stored
            .iter()
            .filter(|sp| sp.passage.version == version)
            .filter_map(|sp| {
                sp.vector.as_ref().map(|v| VectorHit {
                    passage: sp.passage.clone(),
                    score: cosine_similarity(vector, v) as f64,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl LexicalIndex for InMemoryIndex {
    async fn search(&self, query: &str, version: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let stored = self.passages.read().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<(usize, &Passage)> = stored
            .iter()
            .filter(|sp| sp.passage.version == version)
            .filter_map(|sp| {
                let haystack =
                    format!("{} {}", sp.passage.title, sp.passage.text).to_lowercase();
                let count = terms.iter().filter(|t| haystack.contains(*t)).count();
                (count > 0).then_some((count, &sp.passage))
            })
            .collect();
        // Stable sort keeps insertion order among equal matches.
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|(_, p)| LexicalHit {
                passage: p.clone(),
                highlight: None,
            })
            .collect())
    }

    async fn suggest(&self, query: &str, version: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let prefix = query.to_lowercase();
        let stored = self.passages.read().unwrap_or_else(|e| e.into_inner());
        Ok(stored
            .iter()
            .filter(|sp| sp.passage.version == version)
            .filter(|sp| {
                sp.passage
                    .title
                    .to_lowercase()
                    .split_whitespace()
                    .any(|word| word.starts_with(&prefix))
                    || sp.passage.title.to_lowercase().starts_with(&prefix)
            })
            .take(limit)
            .map(|sp| Suggestion {
                text: sp.passage.title.clone(),
                section: sp.passage.section(),
                preview: truncate_with_ellipsis(&sp.passage.text, PREVIEW_CHARS),
            })
            .collect())
    }
}
