//! Upstash Vector client.
//!
//! `POST {url}/query` with a bearer token. Passage attributes are stored as
//! vector metadata and the release tag is applied as a metadata filter.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

use docs_assistant_core::index::{VectorHit, VectorIndex};

use crate::config::VectorConfig;
use crate::http;
use crate::records::passage_from_record;

pub fn create_vector_index(config: &VectorConfig) -> Result<Arc<dyn VectorIndex>> {
    match &config.url {
        Some(url) => Ok(Arc::new(UpstashVectorIndex::new(url, config)?)),
        None => Ok(Arc::new(DisabledVectorIndex)),
    }
}

/// Fails every query; used while no vector store is configured.
pub struct DisabledVectorIndex;

#[async_trait]
impl VectorIndex for DisabledVectorIndex {
    async fn query(&self, _vector: &[f32], _top_k: usize, _version: &str) -> Result<Vec<VectorHit>> {
        bail!("Vector store is not configured")
    }
}

pub struct UpstashVectorIndex {
    client: Client,
    url: String,
    token: String,
}

impl UpstashVectorIndex {
    pub fn new(url: &str, config: &VectorConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            url: url.trim_end_matches('/').to_string(),
            token: http::secret_from_env(&config.token_env)?,
        })
    }
}

/// The metadata filter restricting a query to one release.
pub fn version_filter(version: &str) -> String {
    format!("version = '{}'", version.replace('\'', "\\'"))
}

#[async_trait]
impl VectorIndex for UpstashVectorIndex {
    async fn query(&self, vector: &[f32], top_k: usize, version: &str) -> Result<Vec<VectorHit>> {
        let body = serde_json::json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "filter": version_filter(version),
        });
        let json = http::send_json("Upstash Vector", 0, || {
            self.client
                .post(format!("{}/query", self.url))
                .bearer_auth(&self.token)
                .json(&body)
        })
        .await?;
        parse_query_response(&json)
    }
}

/// Decode `{"result": [{"id", "score", "metadata"}]}`.
///
/// Hits without usable metadata are skipped with a warning.
fn parse_query_response(json: &Value) -> Result<Vec<VectorHit>> {
    let results = json
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Upstash Vector response: missing result array"))?;

    let mut hits = Vec::with_capacity(results.len());
    for item in results {
        let id = match item.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => bail!("Invalid Upstash Vector response: hit without id"),
        };
        let score = item.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0);
        let Some(metadata) = item.get("metadata") else {
            tracing::warn!(id = %id, "vector hit has no metadata, skipping");
            continue;
        };
        match passage_from_record(&id, metadata) {
            Ok(passage) => hits.push(VectorHit { passage, score }),
            Err(e) => tracing::warn!(id = %id, error = %e, "skipping malformed vector hit"),
        }
    }
    Ok(hits)
}
