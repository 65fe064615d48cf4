//! Result fusion of vector and lexical hits.
//!
//! # Fusion Policy
//!
//! 1. Vector hits are inserted first, tagged [`RetrievalSource::Vector`],
//!    keeping their similarity score unmodified.
//! 2. Lexical hits are inserted only when their passage id is not already
//!    present, tagged [`RetrievalSource::Lexical`] with a fixed default
//!    score. Lexical rank is not comparable to vector similarity, so
//!    lexical-only hits sit at a middle rank instead of being compared.
//! 3. Output order is insertion order. It feeds the reranker and is not the
//!    final presentation order.

use std::collections::HashSet;

use crate::index::{LexicalHit, VectorHit};
use crate::models::{Candidate, RetrievalSource};

/// Score assigned to a passage found only by the lexical retriever.
pub const LEXICAL_DEFAULT_SCORE: f64 = 0.5;

/// Merge vector and lexical hits into one deduplicated candidate list.
///
/// A passage id present in both sets yields exactly one candidate, the
/// vector one. Duplicate ids within a single set keep their first
/// occurrence.
pub fn fuse(
    vector_hits: Vec<VectorHit>,
    lexical_hits: Vec<LexicalHit>,
    lexical_default_score: f64,
) -> Vec<Candidate> {
    let mut seen: HashSet<String> = HashSet::with_capacity(vector_hits.len() + lexical_hits.len());
    let mut fused: Vec<Candidate> = Vec::with_capacity(vector_hits.len() + lexical_hits.len());

    for hit in vector_hits {
        if seen.insert(hit.passage.id.clone()) {
            fused.push(Candidate {
                passage: hit.passage,
                score: hit.score,
                source: RetrievalSource::Vector,
                rerank_score: None,
            });
        }
    }

    for hit in lexical_hits {
        if seen.insert(hit.passage.id.clone()) {
            fused.push(Candidate {
                passage: hit.passage,
                score: lexical_default_score,
                source: RetrievalSource::Lexical,
                rerank_score: None,
            });
        }
    }

    fused
}
