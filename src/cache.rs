//! Cache backends.
//!
//! - `memory`: [`InMemoryCache`], process-local and bounded by `max_entries`.
//! - `upstash`: [`UpstashCache`], the Upstash Redis REST API.
//! - `disabled`: [`NoopCache`], every read misses.
//!
//! Cache errors never fail a request. [`get_or_miss`] and [`set_or_log`]
//! are the only way the request path touches a cache.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub use docs_assistant_core::cache::memory::InMemoryCache;
pub use docs_assistant_core::cache::{CacheStore, NoopCache};

use crate::config::CacheConfig;
use crate::http;

const CACHE_TIMEOUT_SECS: u64 = 5;

pub fn create_cache(config: &CacheConfig) -> Result<Arc<dyn CacheStore>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryCache::new(config.max_entries))),
        "disabled" => Ok(Arc::new(NoopCache)),
        "upstash" => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("cache.url required for upstash backend"))?;
            Ok(Arc::new(UpstashCache::new(url, &config.token_env)?))
        }
        other => bail!("Unknown cache backend: {}", other),
    }
}

/// Read `key`, treating any error as a miss.
pub async fn get_or_miss(cache: &dyn CacheStore, key: &str) -> Option<Value> {
    match cache.get(key).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, error = %e, "cache read failed, treating as miss");
            None
        }
    }
}

/// Write `key`, logging and discarding any error.
pub async fn set_or_log(cache: &dyn CacheStore, key: &str, value: &Value, ttl: Duration) {
    if let Err(e) = cache.set(key, value, ttl).await {
        tracing::warn!(key, error = %e, "cache write failed");
    }
}

/// Upstash Redis over REST. Values are stored as JSON strings.
pub struct UpstashCache {
    client: Client,
    url: String,
    token: String,
}

impl UpstashCache {
    pub fn new(url: &str, token_env: &str) -> Result<Self> {
        Ok(Self {
            client: http::client(CACHE_TIMEOUT_SECS)?,
            url: url.trim_end_matches('/').to_string(),
            token: http::secret_from_env(token_env)?,
        })
    }

    async fn command(&self, command: Value) -> Result<Value> {
        let json = http::send_json("Upstash Redis", 0, || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.token)
                .json(&command)
        })
        .await?;
        if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
            bail!("Upstash Redis error: {}", err);
        }
        Ok(json.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Decode a `GET` result: `null` is a miss, a string holds JSON.
fn decode_result(result: Value) -> Result<Option<Value>> {
    match result {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(serde_json::from_str(&s)?)),
        other => Ok(Some(other)),
    }
}

#[async_trait]
impl CacheStore for UpstashCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        decode_result(self.command(serde_json::json!(["GET", key])).await?)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        let ttl_secs = ttl.as_secs().max(1);
        self.command(serde_json::json!(["SET", key, encoded, "EX", ttl_secs]))
            .await?;
        Ok(())
    }
}
