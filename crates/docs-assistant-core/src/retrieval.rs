//! Vector retrieval: embed the query, then ask the nearest-neighbor index.

use std::sync::Arc;

use anyhow::Result;

use crate::embedding::{embed_one, Embedder};
use crate::index::{VectorHit, VectorIndex};

/// Number of candidates each retriever fetches before fusion.
pub const CANDIDATE_K: usize = 50;

/// Embeds a query and returns the nearest passages for one version.
#[derive(Clone)]
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl VectorRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Fails if either the embedding or the index call fails.
    pub async fn retrieve(&self, query: &str, version: &str, limit: usize) -> Result<Vec<VectorHit>> {
        let vector = embed_one(self.embedder.as_ref(), query).await?;
        if vector.len() != self.embedder.dims() {
            anyhow::bail!(
                "embedding has {} dimensions, expected {} for model {}",
                vector.len(),
                self.embedder.dims(),
                self.embedder.model_name()
            );
        }
        self.index.query(&vector, limit, version).await
    }
}
