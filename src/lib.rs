//! # Docs Assistant
//!
//! Hybrid retrieval and cited answers over versioned product documentation.
//!
//! A query runs against a vector store and a full-text index at the same
//! time; the hits are fused, reranked when there are more than requested,
//! and cached. Answer requests pass the evidence through a confidence gate
//! before a generative model writes an answer whose `[n]` markers are bound
//! back to the passages it was shown.
//!
//! ## Architecture
//!
//! ```text
//!               ┌──────────────┐
//!   request ──▶ │ rate limiter │
//!               └──────┬───────┘
//!                      ▼
//!               ┌──────────────┐  hit
//!               │    cache     │──────────────▶ response
//!               └──────┬───────┘
//!            miss ┌────┴─────┐
//!                 ▼          ▼
//!            ┌────────┐ ┌─────────┐
//!            │ vector │ │ lexical │
//!            └───┬────┘ └────┬────┘
//!                └────┬──────┘
//!                     ▼
//!           fuse → rerank → gate → generate → citations
//! ```
//!
//! Pure logic lives in `docs_assistant_core`; this crate holds
//! configuration, the HTTP collaborators, the async pipeline, and the server.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`pipeline`] | Search and answer orchestration |
//! | [`server`] | HTTP API |
//! | [`autocomplete`] | Query suggestions |
//! | [`embedding`] | OpenAI embeddings |
//! | [`vector`] | Upstash Vector |
//! | [`lexical`] | Algolia |
//! | [`rerank`] | Cohere rerank |
//! | [`generate`] | OpenAI chat completions |
//! | [`cache`] | Cache backends |

pub mod autocomplete;
pub mod cache;
pub mod config;
pub mod embedding;
pub mod generate;
pub mod http;
pub mod lexical;
pub mod logging;
pub mod pipeline;
pub mod records;
pub mod rerank;
pub mod server;
pub mod vector;
