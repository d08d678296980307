//! Listing Generator: asks the gateway for synthetic listings, keeps the
//! valid ones, and ingests them into the vector index.
//!
//! Flow: prompt → gateway → raw dump on disk → validate/filter →
//!       to_text → split → embed (concurrent, index-keyed) → store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::prompts::{build_listings_prompt, LISTINGS_FEW_SHOT_EXAMPLE, LISTINGS_SYSTEM};
use crate::generation::splitter::TextSplitter;
use crate::listing::{listing_json_schema, to_text, validate, ListingRecord, RawListing};
use crate::llm_client::{CompletionRequest, JsonObject, ModelGateway};
use crate::store::{ChunkEntry, VectorIndex};

/// Default number of listings requested per run.
pub const DEFAULT_LISTING_COUNT: usize = 10;

pub struct ListingGenerator {
    gateway: Arc<dyn ModelGateway>,
    index: Arc<dyn VectorIndex>,
    splitter: TextSplitter,
    collection: String,
    raw_dump_path: PathBuf,
}

impl ListingGenerator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        raw_dump_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            gateway,
            index,
            splitter: TextSplitter::default(),
            collection: collection.into(),
            raw_dump_path: raw_dump_path.into(),
        }
    }

    /// Requests `count` listings and returns the ones that validate.
    ///
    /// The unfiltered gateway response is written to the raw dump first. An
    /// empty response yields zero records.
    pub async fn generate(&self, count: usize) -> Result<Vec<ListingRecord>, AppError> {
        info!("Generating {count} listings...");

        let prompt = build_listings_prompt(count);
        let schema = listing_json_schema();
        let request = CompletionRequest::new(LISTINGS_SYSTEM, &prompt)
            .with_examples(LISTINGS_FEW_SHOT_EXAMPLE)
            .with_schema(&schema);
        let response = self.gateway.complete_json(request).await;

        self.write_raw_dump(&response).await?;

        if response.is_empty() {
            warn!("Gateway returned no listings; continuing with zero records");
            return Ok(Vec::new());
        }

        let records = parse_listings(response);
        info!("Generated {} valid listings", records.len());
        Ok(records)
    }

    /// Serializes, chunks and embeds `records`, then stores them in a freshly
    /// recreated collection. Returns the stored chunk count.
    pub async fn persist(&self, records: &[ListingRecord]) -> Result<usize, AppError> {
        let pending: Vec<(usize, usize, String)> = records
            .iter()
            .enumerate()
            .flat_map(|(source_index, record)| {
                self.splitter
                    .split(&to_text(record))
                    .into_iter()
                    .enumerate()
                    .map(move |(chunk_index, text)| (source_index, chunk_index, text))
            })
            .collect();
        debug!("Split {} listings into {} chunks", records.len(), pending.len());

        let embeddings = self
            .embed_all(pending.iter().map(|(_, _, text)| text.clone()).collect())
            .await?;

        let chunks: Vec<ChunkEntry> = pending
            .into_iter()
            .zip(embeddings)
            .filter_map(|((source_index, chunk_index, text), embedding)| {
                if embedding.is_empty() {
                    warn!("Skipping chunk {chunk_index} of listing {source_index}: no embedding");
                    return None;
                }
                Some(ChunkEntry {
                    id: Uuid::new_v4(),
                    text,
                    embedding,
                    source_index,
                    chunk_index,
                })
            })
            .collect();

        self.index
            .recreate_collection(&self.collection, self.gateway.embedding_model())
            .await?;
        if !chunks.is_empty() {
            self.index.add(&self.collection, chunks).await?;
        }

        let stored = self.index.count(&self.collection).await?;
        info!(
            "Listings stored in collection '{}' ({stored} chunks)",
            self.collection
        );
        Ok(stored)
    }

    /// Embeds every text concurrently. The gateway's limiter bounds the calls
    /// in flight; results are placed by input index, not completion order.
    async fn embed_all(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let mut embeddings = vec![Vec::new(); texts.len()];
        let mut tasks = JoinSet::new();

        for (i, text) in texts.into_iter().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            tasks.spawn(async move { (i, gateway.embed(&text).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (i, embedding) =
                joined.map_err(|e| AppError::Internal(anyhow!("embedding task failed: {e}")))?;
            embeddings[i] = embedding;
        }

        Ok(embeddings)
    }

    async fn write_raw_dump(&self, response: &JsonObject) -> Result<(), AppError> {
        if let Some(parent) = self.raw_dump_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(response)?;
        tokio::fs::write(&self.raw_dump_path, body).await?;
        info!("Saved raw listings to {:?}", self.raw_dump_path);
        Ok(())
    }

    /// Reads a raw generation dump back.
    pub async fn load_raw_listings(path: &Path) -> Result<JsonObject, AppError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Validates every listing object in the gateway response, dropping the
/// ones that fail. An array value is read as a list of listings.
pub fn parse_listings(response: JsonObject) -> Vec<ListingRecord> {
    let mut records = Vec::new();

    for (key, value) in response {
        let candidates = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        for candidate in candidates {
            let raw: RawListing = match serde_json::from_value(candidate) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Dropping listing '{key}': not a listing object ({e})");
                    continue;
                }
            };
            match validate(raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    "Dropping listing '{key}' (invalid {}): {e}",
                    e.fields().join(", ")
                ),
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::listing::from_text;
    use crate::llm_client::testing::{object, ScriptedGateway};
    use crate::store::{LocalVectorIndex, LISTINGS_COLLECTION};

    fn listing(i: usize) -> Value {
        json!({
            "Neighborhood": format!("Area {i}"),
            "Price": format!("${},000", 300 + i),
            "Bedrooms": 3,
            "Bathrooms": "2",
            "House Size": "1,800 sqft",
            "Description": format!("Bright home number {i} with a garden.")
        })
    }

    fn ten_listings_two_invalid() -> JsonObject {
        let mut map = JsonObject::new();
        for i in 0..10 {
            let mut value = listing(i);
            if i == 3 {
                value.as_object_mut().unwrap().remove("Price");
            }
            if i == 7 {
                value["House Size"] = json!("1800 square meters");
            }
            map.insert(format!("property_{}", i + 1), value);
        }
        map
    }

    /// One-hot embedding keyed on the digit after "Area ".
    fn area_embedding(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 10];
        if let Some(pos) = text.find("Area ") {
            let digit = text[pos + 5..].chars().next().and_then(|c| c.to_digit(10));
            if let Some(d) = digit {
                v[d as usize] = 1.0;
            }
        }
        v
    }

    fn generator(gateway: ScriptedGateway, dir: &TempDir) -> (ListingGenerator, Arc<LocalVectorIndex>) {
        let index = Arc::new(LocalVectorIndex::new(dir.path().join("listings.db")));
        let generator = ListingGenerator::new(
            Arc::new(gateway),
            index.clone(),
            LISTINGS_COLLECTION,
            dir.path().join("listings.json"),
        );
        (generator, index)
    }

    #[test]
    fn test_parse_listings_drops_invalid_entries() {
        let records = parse_listings(ten_listings_two_invalid());
        assert_eq!(records.len(), 8);
        assert!(records.iter().all(|r| r.neighborhood() != "Area 3"));
        assert!(records.iter().all(|r| r.neighborhood() != "Area 7"));
        // Model order is preserved.
        assert_eq!(records[0].neighborhood(), "Area 0");
        assert_eq!(records[7].neighborhood(), "Area 9");
    }

    #[test]
    fn test_parse_listings_reads_arrays_and_skips_scalars() {
        let response = object(json!({
            "properties": [listing(1), listing(2)],
            "note": "here you go"
        }));
        let records = parse_listings(response);
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_keeps_valid_and_dumps_raw() {
        let dir = TempDir::new().unwrap();
        let (generator, _) = generator(ScriptedGateway::new(vec![ten_listings_two_invalid()]), &dir);

        let records = generator.generate(10).await.unwrap();
        assert_eq!(records.len(), 8);

        let raw = ListingGenerator::load_raw_listings(&dir.path().join("listings.json"))
            .await
            .unwrap();
        assert_eq!(raw.len(), 10);
        assert!(raw["property_4"].get("Price").is_none());
    }

    #[tokio::test]
    async fn test_generate_with_empty_response_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let (generator, _) = generator(ScriptedGateway::new(vec![]), &dir);

        let records = generator.generate(10).await.unwrap();
        assert!(records.is_empty());
        assert!(dir.path().join("listings.json").exists());
    }

    #[tokio::test]
    async fn test_persist_stores_one_chunk_per_listing() {
        let dir = TempDir::new().unwrap();
        let gateway = ScriptedGateway::new(vec![]).with_embedder(area_embedding);
        let (generator, index) = generator(gateway, &dir);
        let records = parse_listings(ten_listings_two_invalid());

        let stored = generator.persist(&records).await.unwrap();
        assert_eq!(stored, 8);
        assert_eq!(
            index.embedding_model(LISTINGS_COLLECTION).await.unwrap(),
            "test-embedding"
        );

        // Each chunk carries the embedding of its own listing.
        let hits = index
            .similarity_search(LISTINGS_COLLECTION, &area_embedding("Area 5"), 1)
            .await
            .unwrap();
        assert_eq!(from_text(&hits[0].text).unwrap().neighborhood(), "Area 5");
    }

    #[tokio::test]
    async fn test_persist_skips_chunks_without_embedding() {
        let dir = TempDir::new().unwrap();
        let gateway = ScriptedGateway::new(vec![]).with_embedder(|text| {
            if text.contains("Area 2") {
                Vec::new()
            } else {
                vec![1.0, 0.0]
            }
        });
        let (generator, _) = generator(gateway, &dir);
        let records = parse_listings(object(json!({"a": listing(1), "b": listing(2)})));

        assert_eq!(generator.persist(&records).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_persist_replaces_previous_run() {
        let dir = TempDir::new().unwrap();
        let (generator, index) = generator(ScriptedGateway::new(vec![]), &dir);
        let records = parse_listings(ten_listings_two_invalid());

        generator.persist(&records).await.unwrap();
        let stored = generator.persist(&records[..2]).await.unwrap();
        assert_eq!(stored, 2);
        assert_eq!(index.count(LISTINGS_COLLECTION).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persist_zero_records_creates_empty_collection() {
        let dir = TempDir::new().unwrap();
        let (generator, index) = generator(ScriptedGateway::new(vec![]), &dir);

        assert_eq!(generator.persist(&[]).await.unwrap(), 0);
        assert_eq!(index.count(LISTINGS_COLLECTION).await.unwrap(), 0);
    }
}
