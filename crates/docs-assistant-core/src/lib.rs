//! # Docs Assistant Core
//!
//! Runtime-free logic for the documentation assistant: the passage data
//! model, result fusion, rerank fallback, the confidence gate, answer prompt
//! construction, citation extraction, cache-key derivation, rate limiting,
//! and the collaborator traits every external service is consumed through.
//!
//! This crate contains no tokio, HTTP client, or other I/O dependencies.
//! Concrete collaborators and the async pipeline live in the
//! `docs-assistant` app crate.

pub mod cache;
pub mod citation;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod gate;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod ratelimit;
pub mod rerank;
pub mod retrieval;
