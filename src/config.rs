//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! with all providers disabled and an in-memory cache. Secrets are never
//! read from the file: sections name the environment variables holding them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use docs_assistant_core::ratelimit::{Quota, TierQuotas};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
    pub answer: AnswerConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub lexical: LexicalConfig,
    pub rerank: RerankConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Hits requested from each retriever before fusion.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_version")]
    pub default_version: String,
    #[serde(default = "default_lexical_score")]
    pub lexical_default_score: f64,
    /// Upper bound accepted for a request's `k`.
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            default_k: default_k(),
            default_version: default_version(),
            lexical_default_score: default_lexical_score(),
            max_k: default_max_k(),
        }
    }
}

fn default_candidate_k() -> usize {
    docs_assistant_core::retrieval::CANDIDATE_K
}
fn default_k() -> usize {
    docs_assistant_core::models::DEFAULT_K
}
fn default_version() -> String {
    docs_assistant_core::models::DEFAULT_VERSION.to_string()
}
fn default_lexical_score() -> f64 {
    docs_assistant_core::fusion::LEXICAL_DEFAULT_SCORE
}
fn default_max_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnswerConfig {
    /// `disabled` or `openai`.
    pub provider: String,
    pub model: String,
    pub confidence_threshold: f64,
    /// Passages handed to the model as context.
    pub context_passages: usize,
    /// Passages listed in the low-confidence answer.
    pub fallback_passages: usize,
    pub max_code_blocks: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub product_name: String,
    pub timeout_secs: u64,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: "gpt-4o".to_string(),
            confidence_threshold: docs_assistant_core::gate::CONFIDENCE_THRESHOLD,
            context_passages: 6,
            fallback_passages: 4,
            max_code_blocks: 2,
            temperature: 0.1,
            max_tokens: 1500,
            product_name: "grandMA3".to_string(),
            timeout_secs: 60,
        }
    }
}

impl AnswerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Upstash Vector REST endpoint. Disabled while `url` is unset.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VectorConfig {
    pub url: Option<String>,
    pub token_env: String,
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: None,
            token_env: "UPSTASH_VECTOR_REST_TOKEN".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Algolia index. Disabled while `app_id` is unset.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LexicalConfig {
    pub app_id: Option<String>,
    pub api_key_env: String,
    pub index: String,
    pub timeout_secs: u64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            api_key_env: "ALGOLIA_API_KEY".to_string(),
            index: "ma3_docs".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RerankConfig {
    /// `disabled` or `cohere`.
    pub provider: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: "rerank-v3.5".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    /// `memory`, `upstash`, or `disabled`.
    pub backend: String,
    pub url: Option<String>,
    pub token_env: String,
    pub ttl_secs: u64,
    pub autocomplete_ttl_secs: u64,
    /// Entry bound of the `memory` backend.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            url: None,
            token_env: "UPSTASH_REDIS_REST_TOKEN".to_string(),
            ttl_secs: 900,
            autocomplete_ttl_secs: 300,
            max_entries: docs_assistant_core::cache::memory::DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn autocomplete_ttl(&self) -> Duration {
        Duration::from_secs(self.autocomplete_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub api: Quota,
    pub expensive: Quota,
    pub cached: Quota,
    pub global: Quota,
    /// Seconds advertised in `Retry-After` on a rejection.
    pub retry_after_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let quotas = TierQuotas::default();
        Self {
            api: quotas.api,
            expensive: quotas.expensive,
            cached: quotas.cached,
            global: quotas.global,
            retry_after_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn quotas(&self) -> TierQuotas {
        TierQuotas {
            api: self.api,
            expensive: self.expensive,
            cached: self.cached,
            global: self.global,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    let r = &config.retrieval;
    if r.default_k < 1 {
        anyhow::bail!("retrieval.default_k must be >= 1");
    }
    if r.default_k > r.max_k {
        anyhow::bail!(
            "retrieval.default_k ({}) must be <= retrieval.max_k ({})",
            r.default_k,
            r.max_k
        );
    }
    if r.candidate_k < 1 {
        anyhow::bail!("retrieval.candidate_k must be >= 1");
    }
    if r.default_version.trim().is_empty() {
        anyhow::bail!("retrieval.default_version must not be empty");
    }
    if !(0.0..=1.0).contains(&r.lexical_default_score) {
        anyhow::bail!("retrieval.lexical_default_score must be in [0.0, 1.0]");
    }

    // Validate answer
    let a = &config.answer;
    if !(0.0..=1.0).contains(&a.confidence_threshold) {
        anyhow::bail!("answer.confidence_threshold must be in [0.0, 1.0]");
    }
    if a.context_passages < 1 {
        anyhow::bail!("answer.context_passages must be >= 1");
    }
    match a.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown answer provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate embedding
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    match config.rerank.provider.as_str() {
        "disabled" | "cohere" => {}
        other => anyhow::bail!(
            "Unknown rerank provider: '{}'. Must be disabled or cohere.",
            other
        ),
    }

    match config.cache.backend.as_str() {
        "memory" => {
            if config.cache.max_entries == 0 {
                anyhow::bail!("cache.max_entries must be > 0 for the memory backend");
            }
        }
        "disabled" => {}
        "upstash" => {
            if config.cache.url.is_none() {
                anyhow::bail!("cache.url must be set when backend is 'upstash'");
            }
        }
        other => anyhow::bail!(
            "Unknown cache backend: '{}'. Must be memory, upstash, or disabled.",
            other
        ),
    }

    let rl = &config.rate_limit;
    for (name, quota) in [
        ("api", rl.api),
        ("expensive", rl.expensive),
        ("cached", rl.cached),
        ("global", rl.global),
    ] {
        if quota.max == 0 || quota.window.is_zero() {
            anyhow::bail!("rate_limit.{} needs max > 0 and window_secs > 0", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.retrieval.candidate_k, 50);
        assert_eq!(config.retrieval.default_k, 8);
        assert_eq!(config.retrieval.default_version, "2.3");
        assert_eq!(config.retrieval.lexical_default_score, 0.5);
        assert_eq!(config.answer.confidence_threshold, 0.45);
        assert_eq!(config.answer.context_passages, 6);
        assert_eq!(config.answer.fallback_passages, 4);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.lexical.index, "ma3_docs");
        assert_eq!(config.cache.backend, "memory");
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.rate_limit.expensive.max, 10);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_sections_override_defaults() {
        let file = write_config(
            r#"
[server]
bind = "0.0.0.0:8080"

[retrieval]
default_k = 5
max_k = 20

[answer]
provider = "openai"
confidence_threshold = 0.6

[rate_limit.api]
max = 5
window_secs = 10
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.retrieval.default_k, 5);
        assert_eq!(config.retrieval.candidate_k, 50);
        assert_eq!(config.answer.confidence_threshold, 0.6);
        assert!(config.answer.is_enabled());
        assert_eq!(config.rate_limit.api.max, 5);
        assert_eq!(config.rate_limit.api.window, Duration::from_secs(10));
        assert_eq!(config.rate_limit.cached.max, 60);
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let file = write_config("[answer]\nconfidence_threshold = 1.5\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("confidence_threshold"));
    }

    #[test]
    fn test_rejects_default_k_above_max() {
        let file = write_config("[retrieval]\ndefault_k = 60\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let file = write_config("[rerank]\nprovider = \"voyage\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("rerank provider"));
    }

    #[test]
    fn test_upstash_cache_requires_url() {
        let file = write_config("[cache]\nbackend = \"upstash\"\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_memory_cache_needs_capacity() {
        let file = write_config("[cache]\nmax_entries = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_entries"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_config(Path::new("/nonexistent/dax.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
