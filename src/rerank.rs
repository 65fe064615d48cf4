//! Cohere rerank client.
//!
//! `POST https://api.cohere.com/v2/rerank`. Failures here are recovered by
//! the caller's fallback ordering, so requests are not retried.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use docs_assistant_core::rerank::{RerankScore, Reranker};

use crate::config::RerankConfig;
use crate::http;

const COHERE_RERANK_URL: &str = "https://api.cohere.com/v2/rerank";

/// Environment variable holding the Cohere API key.
pub const COHERE_API_KEY_ENV: &str = "COHERE_API_KEY";

pub fn create_reranker(config: &RerankConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledReranker)),
        "cohere" => Ok(Arc::new(CohereReranker::new(config)?)),
        other => bail!("Unknown rerank provider: {}", other),
    }
}

/// Fails every call, so reranking always takes the fallback ordering.
pub struct DisabledReranker;

#[async_trait]
impl Reranker for DisabledReranker {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn rerank(&self, _query: &str, _documents: &[String], _top_n: usize) -> Result<Vec<RerankScore>> {
        bail!("Rerank provider is disabled")
    }
}

pub struct CohereReranker {
    client: Client,
    api_key: String,
    model: String,
}

impl CohereReranker {
    pub fn new(config: &RerankConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            api_key: http::secret_from_env(COHERE_API_KEY_ENV)?,
            model: config.model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

#[async_trait]
impl Reranker for CohereReranker {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn rerank(&self, query: &str, documents: &[String], top_n: usize) -> Result<Vec<RerankScore>> {
        let body = serde_json::json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });
        let json = http::send_json("Cohere", 0, || {
            self.client
                .post(COHERE_RERANK_URL)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        let parsed: RerankResponse = serde_json::from_value(json)?;
        Ok(parsed.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_ignores_extra_fields() {
        let json = serde_json::json!({
            "id": "abc",
            "results": [
                {"index": 3, "relevance_score": 0.98},
                {"index": 0, "relevance_score": 0.12}
            ],
            "meta": {"billed_units": {"search_units": 1}}
        });
        let parsed: RerankResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.results[0].index, 3);
        assert_eq!(parsed.results[1].relevance_score, 0.12);
    }

    #[tokio::test]
    async fn test_disabled_reranker_fails() {
        let reranker = create_reranker(&RerankConfig::default()).unwrap();
        assert!(reranker.rerank("q", &["a".to_string()], 1).await.is_err());
    }
}
