//! Request-level error taxonomy for the pipeline.
//!
//! Only failures that reach the caller are represented. Rerank and cache
//! failures are recovered where they happen and never appear here, and a
//! single failed retriever degrades recall instead of failing the request.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request violated a schema constraint; no downstream call was made.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Both the vector and the lexical retriever failed.
    #[error("retrieval failed (vector: {vector}; lexical: {lexical})")]
    RetrievalFailed { vector: String, lexical: String },

    /// The generative model call failed. Not retried.
    #[error("answer generation failed: {0}")]
    Generation(String),
}

impl PipelineError {
    /// Whether the caller is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::InvalidRequest(_))
    }

    /// Message safe to show a caller. Upstream response bodies stay in the
    /// full error and are only logged.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::InvalidRequest(_) => self.to_string(),
            PipelineError::RetrievalFailed { .. } => "retrieval unavailable".to_string(),
            PipelineError::Generation(_) => "model call failed".to_string(),
        }
    }
}
