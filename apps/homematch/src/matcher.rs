//! Home Matcher: orchestrates the full pipeline.
//!
//! Flow: generate → persist → search(buyer preferences) → personalize →
//!       write personalized listings JSON.
//!
//! A stage that yields nothing is not fatal; later stages simply process
//! zero items and an empty array is still written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info};

use crate::config::Config;
use crate::errors::AppError;
use crate::generation::ListingGenerator;
use crate::listing::ListingRecord;
use crate::llm_client::ModelGateway;
use crate::personalization::ListingPersonalizer;
use crate::preferences::BuyerPreferences;
use crate::search::ListingSearcher;
use crate::store::{VectorIndex, LISTINGS_COLLECTION};

pub struct HomeMatcher {
    generator: ListingGenerator,
    searcher: ListingSearcher,
    personalizer: ListingPersonalizer,
    listing_count: usize,
    top_k: usize,
    output_path: PathBuf,
}

impl HomeMatcher {
    pub fn new(
        generator: ListingGenerator,
        searcher: ListingSearcher,
        personalizer: ListingPersonalizer,
        listing_count: usize,
        top_k: usize,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator,
            searcher,
            personalizer,
            listing_count,
            top_k,
            output_path: output_path.into(),
        }
    }

    /// Wires every stage to the shared gateway and index.
    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn ModelGateway>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self::new(
            ListingGenerator::new(
                gateway.clone(),
                index.clone(),
                LISTINGS_COLLECTION,
                config.raw_listings_path(),
            ),
            ListingSearcher::new(gateway.clone(), index, LISTINGS_COLLECTION),
            ListingPersonalizer::new(gateway),
            config.listing_count,
            config.search_top_k,
            config.personalized_listings_path(),
        )
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Runs the pipeline and returns the personalized listings.
    pub async fn run(&self, preferences: &BuyerPreferences) -> Result<Vec<ListingRecord>, AppError> {
        let query = preferences.to_text();

        info!("[1/4] Generating listings");
        let records = self.generator.generate(self.listing_count).await?;

        info!("[2/4] Storing {} listings in the vector index", records.len());
        self.generator.persist(&records).await?;

        info!("[3/4] Searching for listings matching the buyer preferences");
        let chunks = self.searcher.search(&query, self.top_k).await?;

        info!("[4/4] Personalizing {} listings", chunks.len());
        let personalized = match self.personalizer.personalize(&query, &chunks).await {
            Ok(listings) => listings,
            Err(e) => {
                error!("Personalization aborted, writing an empty result: {e}");
                Vec::new()
            }
        };

        self.write_matches(&personalized).await?;
        info!(
            "Personalized listings saved to {:?} ({} listings)",
            self.output_path,
            personalized.len()
        );
        Ok(personalized)
    }

    async fn write_matches(&self, listings: &[ListingRecord]) -> Result<(), AppError> {
        if let Some(parent) = self.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(listings)?;
        tokio::fs::write(&self.output_path, body).await?;
        Ok(())
    }

    /// Reads a previously written personalized listings file.
    pub async fn load_matches(path: &Path) -> Result<Vec<ListingRecord>, AppError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
