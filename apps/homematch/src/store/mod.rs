//! Vector Index: named collections of embedded text chunks.
//!
//! `LocalVectorIndex` keeps one JSON document per collection under a root
//! directory. Search is exact cosine distance over every stored chunk, ties
//! kept in insertion order.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Collection name used for generated listings.
pub const LISTINGS_COLLECTION: &str = "listings_embeddings";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("invalid collection name '{0}'")]
    InvalidName(String),

    #[error("dimension mismatch in '{collection}': expected {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("empty embedding for chunk {0}")]
    EmptyEmbedding(Uuid),

    #[error(
        "embedding model mismatch for '{collection}': stored with '{stored}', queried with '{query}'"
    )]
    EmbeddingModelMismatch {
        collection: String,
        stored: String,
        query: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt collection file: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A chunk ready to be appended to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Index of the listing this chunk was serialized from.
    pub source_index: usize,
    /// Position of this chunk within its listing's serialization.
    pub chunk_index: usize,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: Uuid,
    pub text: String,
    /// Cosine distance to the query (0.0 = identical direction).
    pub distance: f32,
}

/// The vector index collaborator. Carried as `Arc<dyn VectorIndex>`.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces any collection of the same name with an empty one.
    async fn recreate_collection(&self, name: &str, embedding_model: &str) -> Result<(), StoreError>;

    async fn add(&self, name: &str, chunks: Vec<ChunkEntry>) -> Result<(), StoreError>;

    /// The `k` nearest chunks by cosine distance; all chunks if fewer exist.
    async fn similarity_search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    async fn count(&self, name: &str) -> Result<usize, StoreError>;

    /// Embedding model the collection was built with.
    async fn embedding_model(&self, name: &str) -> Result<String, StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    embedding_model: String,
    dimension: Option<usize>,
    created_at: DateTime<Utc>,
    chunks: Vec<ChunkEntry>,
}

/// File-backed vector index rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalVectorIndex {
    root: PathBuf,
}

impl LocalVectorIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    async fn load(&self, name: &str) -> Result<CollectionFile, StoreError> {
        let path = self.collection_path(name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::CollectionNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Writes through a temp file and rename so readers never see a torn file.
    async fn save(&self, collection: &CollectionFile) -> Result<(), StoreError> {
        let path = self.collection_path(&collection.name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec(collection)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(
            "Saved collection '{}' ({} chunks) to {:?}",
            collection.name,
            collection.chunks.len(),
            path
        );
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalVectorIndex {
    async fn recreate_collection(&self, name: &str, embedding_model: &str) -> Result<(), StoreError> {
        let collection = CollectionFile {
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            dimension: None,
            created_at: Utc::now(),
            chunks: Vec::new(),
        };
        self.save(&collection).await?;
        info!("Recreated collection '{name}' under {:?}", self.root);
        Ok(())
    }

    async fn add(&self, name: &str, chunks: Vec<ChunkEntry>) -> Result<(), StoreError> {
        let mut collection = self.load(name).await?;

        for chunk in &chunks {
            if chunk.embedding.is_empty() {
                return Err(StoreError::EmptyEmbedding(chunk.id));
            }
            let expected = *collection.dimension.get_or_insert(chunk.embedding.len());
            if chunk.embedding.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    collection: name.to_string(),
                    expected,
                    actual: chunk.embedding.len(),
                });
            }
        }

        collection.chunks.extend(chunks);
        self.save(&collection).await
    }

    async fn similarity_search(
        &self,
        name: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let collection = self.load(name).await?;

        if let Some(expected) = collection.dimension {
            if query.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    collection: name.to_string(),
                    expected,
                    actual: query.len(),
                });
            }
        }

        let mut scored: Vec<RetrievedChunk> = collection
            .chunks
            .into_iter()
            .map(|chunk| RetrievedChunk {
                distance: cosine_distance(query, &chunk.embedding),
                id: chunk.id,
                text: chunk.text,
            })
            .collect();

        // Stable sort keeps insertion order among equal distances.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, name: &str) -> Result<usize, StoreError> {
        Ok(self.load(name).await?.chunks.len())
    }

    async fn embedding_model(&self, name: &str) -> Result<String, StoreError> {
        Ok(self.load(name).await?.embedding_model)
    }
}

/// `1 - cos(a, b)`; a zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str, embedding: Vec<f32>, source_index: usize) -> ChunkEntry {
        ChunkEntry {
            id: Uuid::new_v4(),
            text: text.to_string(),
            embedding,
            source_index,
            chunk_index: 0,
        }
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_add_and_search_orders_by_distance() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        index.recreate_collection("homes", "m").await.unwrap();
        index
            .add(
                "homes",
                vec![
                    chunk("east", vec![1.0, 0.0], 0),
                    chunk("north", vec![0.0, 1.0], 1),
                    chunk("north-east", vec![1.0, 1.0], 2),
                ],
            )
            .await
            .unwrap();

        let results = index.similarity_search("homes", &[0.0, 1.0], 2).await.unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["north", "north-east"]);
        assert!(results[0].distance <= results[1].distance);
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        index.recreate_collection("homes", "m").await.unwrap();
        index
            .add(
                "homes",
                vec![
                    chunk("first", vec![1.0, 0.0], 0),
                    chunk("second", vec![2.0, 0.0], 1),
                    chunk("third", vec![3.0, 0.0], 2),
                ],
            )
            .await
            .unwrap();

        let results = index.similarity_search("homes", &[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<_> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_search_with_fewer_chunks_than_k() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        index.recreate_collection("homes", "m").await.unwrap();
        index
            .add("homes", vec![chunk("only", vec![1.0, 0.0], 0)])
            .await
            .unwrap();

        let results = index.similarity_search("homes", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_recreate_replaces_existing_collection() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        index.recreate_collection("homes", "old-model").await.unwrap();
        index
            .add("homes", vec![chunk("stale", vec![1.0, 0.0, 0.0], 0)])
            .await
            .unwrap();

        index.recreate_collection("homes", "new-model").await.unwrap();
        assert_eq!(index.count("homes").await.unwrap(), 0);
        assert_eq!(index.embedding_model("homes").await.unwrap(), "new-model");

        // Dimension resets with the collection.
        index
            .add("homes", vec![chunk("fresh", vec![1.0, 0.0], 0)])
            .await
            .unwrap();
        assert_eq!(index.count("homes").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_appends_across_calls() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        index.recreate_collection("homes", "m").await.unwrap();
        index.add("homes", vec![chunk("a", vec![1.0], 0)]).await.unwrap();
        index.add("homes", vec![chunk("b", vec![2.0], 1)]).await.unwrap();
        assert_eq!(index.count("homes").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        index.recreate_collection("homes", "m").await.unwrap();
        let result = index
            .add(
                "homes",
                vec![chunk("a", vec![1.0, 0.0], 0), chunk("b", vec![1.0], 1)],
            )
            .await;
        assert!(matches!(result, Err(StoreError::DimensionMismatch { .. })));
        assert_eq!(index.count("homes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_collection_reported() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        let result = index.similarity_search("nothing", &[1.0], 5).await;
        assert!(matches!(result, Err(StoreError::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_collection_name_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let index = LocalVectorIndex::new(temp_dir.path());
        let result = index.recreate_collection("../escape", "m").await;
        assert!(matches!(result, Err(StoreError::InvalidName(_))));
    }
}
