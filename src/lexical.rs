//! Algolia full-text index client.
//!
//! Queries `POST https://{app_id}-dsn.algolia.net/1/indexes/{index}/query`
//! with the application id and API key headers. The release tag is applied
//! as a `version:<v>` filter. Algolia ranks hits but exposes no comparable
//! numeric score, so hits carry only their position.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

use docs_assistant_core::citation::truncate_with_ellipsis;
use docs_assistant_core::index::{LexicalHit, LexicalIndex, Suggestion};

use crate::config::LexicalConfig;
use crate::http;
use crate::records::passage_from_record;

/// Characters of passage text shown in a suggestion preview.
pub const SUGGESTION_PREVIEW_CHARS: usize = 100;

const RETRIEVED_ATTRIBUTES: [&str; 7] = [
    "objectID",
    "text",
    "url",
    "title",
    "section_path",
    "version",
    "code_blocks",
];

pub fn create_lexical_index(config: &LexicalConfig) -> Result<Arc<dyn LexicalIndex>> {
    match &config.app_id {
        Some(app_id) => Ok(Arc::new(AlgoliaIndex::new(app_id, config)?)),
        None => Ok(Arc::new(DisabledLexicalIndex)),
    }
}

/// Fails every query; used while no lexical index is configured.
pub struct DisabledLexicalIndex;

#[async_trait]
impl LexicalIndex for DisabledLexicalIndex {
    async fn search(&self, _query: &str, _version: &str, _limit: usize) -> Result<Vec<LexicalHit>> {
        bail!("Lexical index is not configured")
    }

    async fn suggest(&self, _query: &str, _version: &str, _limit: usize) -> Result<Vec<Suggestion>> {
        bail!("Lexical index is not configured")
    }
}

pub struct AlgoliaIndex {
    client: Client,
    app_id: String,
    api_key: String,
    query_url: String,
}

impl AlgoliaIndex {
    pub fn new(app_id: &str, config: &LexicalConfig) -> Result<Self> {
        Ok(Self {
            client: http::client(config.timeout_secs)?,
            app_id: app_id.to_string(),
            api_key: http::secret_from_env(&config.api_key_env)?,
            query_url: format!(
                "https://{}-dsn.algolia.net/1/indexes/{}/query",
                app_id.to_lowercase(),
                config.index
            ),
        })
    }

    async fn query(&self, body: Value) -> Result<Value> {
        http::send_json("Algolia", 0, || {
            self.client
                .post(&self.query_url)
                .header("X-Algolia-Application-Id", &self.app_id)
                .header("X-Algolia-API-Key", &self.api_key)
                .json(&body)
        })
        .await
    }
}

pub fn version_filter(version: &str) -> String {
    format!("version:{}", version)
}

#[async_trait]
impl LexicalIndex for AlgoliaIndex {
    async fn search(&self, query: &str, version: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        let json = self
            .query(serde_json::json!({
                "query": query,
                "filters": version_filter(version),
                "hitsPerPage": limit,
                "attributesToRetrieve": RETRIEVED_ATTRIBUTES,
                "attributesToHighlight": ["text", "title"],
            }))
            .await?;
        parse_hits(&json)
    }

    async fn suggest(&self, query: &str, version: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let json = self
            .query(serde_json::json!({
                "query": query,
                "filters": version_filter(version),
                "hitsPerPage": limit,
                "attributesToRetrieve": RETRIEVED_ATTRIBUTES,
                "attributesToHighlight": ["title"],
                "queryType": "prefixAll",
                "distinct": true,
            }))
            .await?;
        Ok(parse_hits(&json)?
            .into_iter()
            .map(|hit| Suggestion {
                section: hit.passage.section(),
                preview: truncate_with_ellipsis(&hit.passage.text, SUGGESTION_PREVIEW_CHARS),
                text: hit.passage.title,
            })
            .collect())
    }
}

fn parse_hits(json: &Value) -> Result<Vec<LexicalHit>> {
    let hits = json
        .get("hits")
        .and_then(|h| h.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Algolia response: missing hits array"))?;

    let mut parsed = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(id) = hit.get("objectID").and_then(|v| v.as_str()) else {
            tracing::warn!("lexical hit has no objectID, skipping");
            continue;
        };
        match passage_from_record(id, hit) {
            Ok(passage) => parsed.push(LexicalHit {
                passage,
                highlight: hit
                    .pointer("/_highlightResult/text/value")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            }),
            Err(e) => tracing::warn!(id, error = %e, "skipping malformed lexical hit"),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_hits_keeps_rank_order() {
        let json = json!({
            "hits": [
                {"objectID": "p2", "text": "Delete removes cues.", "title": "Delete",
                 "section_path": ["Commands", "Delete"], "version": "2.3",
                 "_highlightResult": {"text": {"value": "<em>Delete</em> removes cues."}}},
                {"objectID": "p1", "text": "Store saves cues.", "title": "Store",
                 "section_path": "Commands > Store", "version": "2.3"},
                {"text": "orphan"}
            ]
        });
        let hits = parse_hits(&json).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.passage.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p1"]);
        assert_eq!(
            hits[0].highlight.as_deref(),
            Some("<em>Delete</em> removes cues.")
        );
        assert_eq!(hits[1].passage.section(), "Commands > Store");
    }

    #[test]
    fn test_version_filter() {
        assert_eq!(version_filter("2.3"), "version:2.3");
    }

    #[tokio::test]
    async fn test_unconfigured_index_fails() {
        let index = create_lexical_index(&LexicalConfig::default()).unwrap();
        assert!(index.search("store", "2.3", 5).await.is_err());
        assert!(index.suggest("sto", "2.3", 5).await.is_err());
    }
}
