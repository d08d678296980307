//! Semantic Searcher: nearest-neighbour lookup of stored listing chunks.
//!
//! Queries must be embedded with the same model the collection was built
//! with; the searcher refuses to compare vectors from different models.

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::ModelGateway;
use crate::store::{RetrievedChunk, StoreError, VectorIndex};

pub const DEFAULT_TOP_K: usize = 5;

pub struct ListingSearcher {
    gateway: Arc<dyn ModelGateway>,
    index: Arc<dyn VectorIndex>,
    collection: String,
}

impl ListingSearcher {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            index,
            collection: collection.into(),
        }
    }

    /// Returns up to `k` chunks nearest to `query`, closest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, AppError> {
        info!("Searching for listings similar to the buyer preferences");

        let stored_model = self.index.embedding_model(&self.collection).await?;
        let query_model = self.gateway.embedding_model();
        if stored_model != query_model {
            return Err(StoreError::EmbeddingModelMismatch {
                collection: self.collection.clone(),
                stored: stored_model,
                query: query_model.to_string(),
            }
            .into());
        }

        let count = self.index.count(&self.collection).await?;
        info!("Count of items in collection '{}': {count}", self.collection);
        if count == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.gateway.embed(query).await;
        if embedding.is_empty() {
            warn!("Query embedding is empty; returning no matches");
            return Ok(Vec::new());
        }

        let hits = self
            .index
            .similarity_search(&self.collection, &embedding, k)
            .await?;
        info!("Found {} similar listings", hits.len());
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;
    use crate::llm_client::testing::ScriptedGateway;
    use crate::store::{ChunkEntry, LocalVectorIndex};

    async fn seeded_index(dir: &TempDir, texts: &[&str]) -> Arc<LocalVectorIndex> {
        let index = Arc::new(LocalVectorIndex::new(dir.path()));
        index.recreate_collection("homes", "test-embedding").await.unwrap();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkEntry {
                id: Uuid::new_v4(),
                text: text.to_string(),
                embedding: vec![text.len() as f32, 1.0],
                source_index: i,
                chunk_index: 0,
            })
            .collect();
        index.add("homes", chunks).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_search_returns_all_when_fewer_than_k() {
        let dir = TempDir::new().unwrap();
        let index = seeded_index(&dir, &["pool", "garden", "garage"]).await;
        let searcher = ListingSearcher::new(Arc::new(ScriptedGateway::new(vec![])), index, "homes");

        let hits = searcher.search("schools", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_search_limits_to_k_closest_first() {
        let dir = TempDir::new().unwrap();
        let index = seeded_index(&dir, &["a", "bbbbbbbbbbbbbbbbbbbb", "cc"]).await;
        let searcher = ListingSearcher::new(Arc::new(ScriptedGateway::new(vec![])), index, "homes");

        // Query "z" embeds to [1, 1], same direction as "a".
        let hits = searcher.search("z", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "a");
        assert_eq!(hits[1].text, "cc");
    }

    #[tokio::test]
    async fn test_search_rejects_embedding_model_mismatch() {
        let dir = TempDir::new().unwrap();
        let index = seeded_index(&dir, &["pool"]).await;
        let gateway = ScriptedGateway::new(vec![]).with_model("other-model");
        let searcher = ListingSearcher::new(Arc::new(gateway), index, "homes");

        let result = searcher.search("pool", 5).await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::EmbeddingModelMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn test_search_empty_collection() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(LocalVectorIndex::new(dir.path()));
        index.recreate_collection("homes", "test-embedding").await.unwrap();
        let searcher = ListingSearcher::new(Arc::new(ScriptedGateway::new(vec![])), index, "homes");

        assert!(searcher.search("pool", 5).await.unwrap().is_empty());
    }
}
