//! In-memory [`CacheStore`] backed by `moka`.
//!
//! TinyLFU admission with a bounded entry count. Each entry carries its own
//! TTL, taken from the `ttl` passed to [`CacheStore::set`].

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;
use serde_json::Value;

use super::CacheStore;

/// Entry bound used by [`InMemoryCache::default`].
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct Entry {
    value: Value,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Process-local TTL cache holding at most `max_entries` responses.
pub struct InMemoryCache {
    cache: Cache<String, Entry>,
}

impl InMemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Number of live entries, after pending evictions are applied.
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.get(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        self.cache.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    #[test]
    fn test_set_then_get() {
        let cache = InMemoryCache::default();
        block_on(async {
            cache
                .set("search:abc", &json!({"query": "store"}), Duration::from_secs(60))
                .await
                .unwrap();
            let v = cache.get("search:abc").await.unwrap().unwrap();
            assert_eq!(v["query"], "store");
            assert!(cache.get("search:missing").await.unwrap().is_none());
        });
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let cache = InMemoryCache::default();
        block_on(async {
            cache.set("k", &json!(1), Duration::ZERO).await.unwrap();
            assert!(cache.get("k").await.unwrap().is_none());
        });
    }

    #[test]
    fn test_entries_keep_their_own_ttl() {
        let cache = InMemoryCache::default();
        block_on(async {
            cache.set("short", &json!(1), Duration::ZERO).await.unwrap();
            cache.set("long", &json!(2), Duration::from_secs(900)).await.unwrap();
            assert!(cache.get("short").await.unwrap().is_none());
            assert_eq!(cache.get("long").await.unwrap(), Some(json!(2)));
        });
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let cache = InMemoryCache::default();
        block_on(async {
            cache.set("k", &json!(1), Duration::from_secs(60)).await.unwrap();
            cache.set("k", &json!(2), Duration::from_secs(60)).await.unwrap();
            assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
        });
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_bound_evicts() {
        let cache = InMemoryCache::new(100);
        block_on(async {
            for i in 0..5_000 {
                cache
                    .set(&format!("search:{}", i), &json!(i), Duration::from_secs(900))
                    .await
                    .unwrap();
            }
        });
        assert!(cache.len() <= 100, "entries held: {}", cache.len());
    }
}
