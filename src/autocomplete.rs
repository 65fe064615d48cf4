//! Query suggestions for the search box.
//!
//! A few entries from a fixed list of popular searches come first, then
//! prefix matches from the lexical index. Suggestions are a convenience:
//! any failure produces an empty list instead of an error.

use std::sync::Arc;
use std::time::Duration;

use docs_assistant_core::cache::CacheStore;
use docs_assistant_core::index::{LexicalIndex, Suggestion};

use crate::cache::{get_or_miss, set_or_log};

/// Queries shorter than this get no suggestions.
pub const MIN_QUERY_CHARS: usize = 2;
pub const MAX_POPULAR: usize = 3;
pub const MAX_LEXICAL: usize = 5;
pub const MAX_SUGGESTIONS: usize = 8;

pub const POPULAR_SECTION: &str = "Popular search";
pub const POPULAR_PREVIEW: &str = "Frequently searched topic";

pub const POPULAR_QUERIES: [&str; 10] = [
    "Store command",
    "MAtricks",
    "Delete cue",
    "Phaser effect",
    "Timecode trigger",
    "Preset types",
    "Go vs Goto",
    "MA-Net3 setup",
    "Patch fixtures",
    "Recipe values",
];

pub fn cache_key(query: &str, version: &str) -> String {
    format!("autocomplete:{}:{}", query, version)
}

/// Popular searches containing `query`, case-insensitively.
pub fn popular_matches(query: &str) -> Vec<Suggestion> {
    let needle = query.to_lowercase();
    POPULAR_QUERIES
        .iter()
        .filter(|q| q.to_lowercase().contains(&needle))
        .take(MAX_POPULAR)
        .map(|q| Suggestion {
            text: q.to_string(),
            section: POPULAR_SECTION.to_string(),
            preview: POPULAR_PREVIEW.to_string(),
        })
        .collect()
}

#[derive(Clone)]
pub struct Autocomplete {
    lexical: Arc<dyn LexicalIndex>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl Autocomplete {
    pub fn new(lexical: Arc<dyn LexicalIndex>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            lexical,
            cache,
            ttl,
        }
    }

    pub async fn suggest(&self, query: &str, version: &str) -> Vec<Suggestion> {
        if query.chars().count() < MIN_QUERY_CHARS {
            return Vec::new();
        }

        let key = cache_key(query, version);
        if let Some(cached) = get_or_miss(self.cache.as_ref(), &key).await {
            match serde_json::from_value::<Vec<Suggestion>>(cached) {
                Ok(suggestions) => return suggestions,
                Err(e) => tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry"),
            }
        }

        let lexical = match self.lexical.suggest(query, version, MAX_LEXICAL).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "autocomplete lookup failed");
                return Vec::new();
            }
        };

        let mut suggestions = popular_matches(query);
        suggestions.extend(lexical.into_iter().take(MAX_LEXICAL));
        suggestions.truncate(MAX_SUGGESTIONS);

        if let Ok(value) = serde_json::to_value(&suggestions) {
            set_or_log(self.cache.as_ref(), &key, &value, self.ttl).await;
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_popular_matches_case_insensitive_and_capped() {
        let matches = popular_matches("E");
        assert_eq!(matches.len(), MAX_POPULAR);
        assert_eq!(matches[0].text, "Store command");
        assert_eq!(matches[0].section, POPULAR_SECTION);

        let cue = popular_matches("cue");
        assert_eq!(cue.len(), 1);
        assert_eq!(cue[0].text, "Delete cue");
    }

    #[test]
    fn test_cache_key_shape() {
        assert_eq!(cache_key("sto", "2.3"), "autocomplete:sto:2.3");
    }
}
