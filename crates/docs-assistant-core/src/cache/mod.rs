//! Result cache abstraction and cache-key derivation.
//!
//! The [`CacheStore`] trait is the narrow get/set-with-TTL interface the
//! pipeline uses; cache failures are the caller's to swallow. Keys come
//! from [`derive_key`], which is independent of parameter insertion order.
//!
//! # Key Derivation
//!
//! 1. Sort parameter names lexicographically.
//! 2. Serialize the sorted mapping as compact JSON.
//! 3. SHA-256 the JSON and keep the first 16 hex characters.
//! 4. Prefix with a namespace tag: `search:1f3a…`.

pub mod memory;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::SearchRequest;

/// Namespace tag for search-response keys.
pub const SEARCH_NAMESPACE: &str = "search";

/// Hex characters of the digest kept in a key.
pub const KEY_HEX_CHARS: usize = 16;

/// Default lifetime of a cached search response (15 minutes).
pub const SEARCH_TTL: Duration = Duration::from_secs(900);

/// A key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()>;
}

/// A cache that stores nothing. Every read misses.
pub struct NoopCache;

#[async_trait]
impl CacheStore for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) -> Result<()> {
        Ok(())
    }
}

/// Derive a stable, namespaced key from request parameters.
pub fn derive_key<'a, I>(namespace: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, Value)>,
{
    let sorted: BTreeMap<&str, Value> = params.into_iter().collect();
    // A BTreeMap of JSON values always serializes.
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}:{}", namespace, &digest[..KEY_HEX_CHARS])
}

/// The cache key for a search request.
///
/// `path` takes part in the key only when present.
pub fn search_key(req: &SearchRequest) -> String {
    let mut params: Vec<(&str, Value)> = vec![
        ("query", Value::from(req.query.as_str())),
        ("k", Value::from(req.k)),
        ("version", Value::from(req.version.as_str())),
    ];
    if let Some(path) = &req.path {
        params.push(("path", Value::from(path.as_str())));
    }
    derive_key(SEARCH_NAMESPACE, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_independent_of_insertion_order() {
        let a = derive_key(
            SEARCH_NAMESPACE,
            vec![("query", json!("a")), ("version", json!("2.3"))],
        );
        let b = derive_key(
            SEARCH_NAMESPACE,
            vec![("version", json!("2.3")), ("query", json!("a"))],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_changes_with_values() {
        let a = derive_key(
            SEARCH_NAMESPACE,
            vec![("query", json!("a")), ("version", json!("2.3"))],
        );
        let b = derive_key(
            SEARCH_NAMESPACE,
            vec![("query", json!("b")), ("version", json!("2.3"))],
        );
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_shape() {
        let key = derive_key(SEARCH_NAMESPACE, vec![("query", json!("store"))]);
        let (ns, hex) = key.split_once(':').unwrap();
        assert_eq!(ns, "search");
        assert_eq!(hex.len(), KEY_HEX_CHARS);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_matches_known_digest() {
        // sha256(r#"{"query":"a","version":"2.3"}"#) begins with these characters.
        let mut hasher = Sha256::new();
        hasher.update(br#"{"query":"a","version":"2.3"}"#);
        let expected = format!("search:{}", &format!("{:x}", hasher.finalize())[..16]);
        let key = derive_key(
            SEARCH_NAMESPACE,
            vec![("version", json!("2.3")), ("query", json!("a"))],
        );
        assert_eq!(key, expected);
    }

    #[test]
    fn test_search_key_includes_path_only_when_set() {
        let mut req = SearchRequest::new("Store command");
        let without = search_key(&req);
        req.path = Some("/cues".to_string());
        let with = search_key(&req);
        assert_ne!(without, with);
        assert_eq!(search_key(&SearchRequest::new("Store command")), without);
    }

    #[test]
    fn test_noop_cache_always_misses() {
        let cache = NoopCache;
        futures::executor::block_on(async {
            cache.set("k", &json!(1), SEARCH_TTL).await.unwrap();
            assert!(cache.get("k").await.unwrap().is_none());
        });
    }
}
