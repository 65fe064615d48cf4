//! Cross-encoder reranking with a deterministic local fallback.
//!
//! Reranking only runs when the fused candidate list is longer than the
//! requested result count. A failing rerank service is never surfaced: the
//! first `top_n` candidates are kept in fused order with synthetic,
//! strictly decreasing scores so the confidence gate still sees a ranking.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::Candidate;

/// Score of the first candidate in the fallback ordering.
pub const FALLBACK_TOP_SCORE: f64 = 1.0;
/// Decrement between consecutive fallback scores.
pub const FALLBACK_STEP: f64 = 0.1;

/// Relevance of one document, by its index in the submitted list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    pub index: usize,
    pub relevance_score: f64,
}

/// A cross-encoder rerank service.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Returns the model identifier (e.g. `"rerank-v3.5"`).
    fn model_name(&self) -> &str;

    /// Score `documents` against `query` and return the `top_n` best,
    /// most relevant first.
    async fn rerank(&self, query: &str, documents: &[String], top_n: usize)
        -> Result<Vec<RerankScore>>;
}

/// Synthetic scores used when the rerank call fails: the first `top_n`
/// documents in their given order, scored `1.0 - 0.1 * index`.
pub fn fallback_scores(document_count: usize, top_n: usize) -> Vec<RerankScore> {
    (0..document_count.min(top_n))
        .map(|index| RerankScore {
            index,
            relevance_score: FALLBACK_TOP_SCORE - FALLBACK_STEP * index as f64,
        })
        .collect()
}

/// Call the reranker, falling back to [`fallback_scores`] on any error.
///
/// Indices outside `documents` are dropped from a successful response.
pub async fn rerank_or_fallback(
    reranker: &dyn Reranker,
    query: &str,
    documents: &[String],
    top_n: usize,
) -> Vec<RerankScore> {
    match reranker.rerank(query, documents, top_n).await {
        Ok(scores) => {
            let valid: Vec<RerankScore> = scores
                .into_iter()
                .filter(|s| s.index < documents.len())
                .take(top_n)
                .collect();
            tracing::debug!(
                model = reranker.model_name(),
                documents = documents.len(),
                returned = valid.len(),
                "reranked candidates"
            );
            valid
        }
        Err(e) => {
            tracing::warn!(
                model = reranker.model_name(),
                error = %e,
                "rerank failed, keeping fused order"
            );
            fallback_scores(documents.len(), top_n)
        }
    }
}

/// Build the reranked candidate list: each scored index becomes a copy of
/// that candidate with `rerank_score` set, in score-list order.
pub fn apply_rerank(candidates: &[Candidate], scores: &[RerankScore]) -> Vec<Candidate> {
    scores
        .iter()
        .filter_map(|s| {
            candidates.get(s.index).map(|c| Candidate {
                rerank_score: Some(s.relevance_score),
                ..c.clone()
            })
        })
        .collect()
}

/// Reduce fused candidates to at most `k`, reranking only when there are
/// more than `k` of them.
pub async fn rerank_candidates(
    reranker: &dyn Reranker,
    query: &str,
    mut candidates: Vec<Candidate>,
    k: usize,
) -> Vec<Candidate> {
    if candidates.len() <= k {
        candidates.truncate(k);
        return candidates;
    }

    let documents: Vec<String> = candidates.iter().map(|c| c.passage.text.clone()).collect();
    let scores = rerank_or_fallback(reranker, query, &documents, k).await;
    apply_rerank(&candidates, &scores)
}
