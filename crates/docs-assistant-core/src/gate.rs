//! Confidence gate between answer generation and the closest-matches
//! fallback.
//!
//! The gate averages the effective score (rerank score if present, else
//! retrieval score) of the top passages and compares it with a fixed
//! threshold. Fallback fires only in strict mode and only when the average
//! is strictly below the threshold.

use crate::models::{AnswerMode, Candidate};

/// Minimum average top-passage score for a strict-mode answer.
pub const CONFIDENCE_THRESHOLD: f64 = 0.45;

/// Number of leading passages averaged by the gate.
pub const GATE_WINDOW: usize = 3;

/// What the pipeline should do with the retrieved evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Generate,
    Fallback,
}

/// The gate's decision together with the score it was based on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOutcome {
    pub confidence: f64,
    pub decision: GateDecision,
}

/// Mean effective score of the first [`GATE_WINDOW`] passages.
///
/// An empty list has confidence `0.0`.
pub fn confidence(passages: &[Candidate]) -> f64 {
    let window = &passages[..passages.len().min(GATE_WINDOW)];
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(Candidate::effective_score).sum::<f64>() / window.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceGate {
    threshold: f64,
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(CONFIDENCE_THRESHOLD)
    }
}

impl ConfidenceGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, passages: &[Candidate], mode: AnswerMode) -> GateOutcome {
        let confidence = confidence(passages);
        let decision = if mode == AnswerMode::Strict && confidence < self.threshold {
            GateDecision::Fallback
        } else {
            GateDecision::Generate
        };
        GateOutcome {
            confidence,
            decision,
        }
    }
}
