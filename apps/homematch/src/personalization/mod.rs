//! Personalizer: rewrites each retrieved listing's description around the
//! buyer's preferences.
//!
//! Listings are processed strictly one after another, in retrieval order.
//! Each gets at most `MAX_ATTEMPTS` gateway calls spaced by `RETRY_DELAY`;
//! if none yields a string "Augmented Description", the original description
//! is used instead. The field is always populated on return.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::clock::{Sleeper, TokioSleeper};
use crate::errors::AppError;
use crate::listing::{from_text, ListingRecord};
use crate::llm_client::{CompletionRequest, JsonObject, ModelGateway};
use crate::store::RetrievedChunk;

pub mod prompts;

use prompts::{
    augmented_description_schema, build_personalization_prompt, AUGMENTED_DESCRIPTION_KEY,
    PERSONALIZATION_FEW_SHOT_EXAMPLE, PERSONALIZATION_SYSTEM,
};

pub const MAX_ATTEMPTS: u32 = 5;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct ListingPersonalizer {
    gateway: Arc<dyn ModelGateway>,
    sleeper: Arc<dyn Sleeper>,
}

impl ListingPersonalizer {
    pub fn new(gateway: Arc<dyn ModelGateway>) -> Self {
        Self::with_sleeper(gateway, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(gateway: Arc<dyn ModelGateway>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { gateway, sleeper }
    }

    /// Reconstructs every chunk, then augments each record in order.
    /// Fails on the first chunk that does not parse back into a listing.
    pub async fn personalize(
        &self,
        buyer_preferences: &str,
        chunks: &[RetrievedChunk],
    ) -> Result<Vec<ListingRecord>, AppError> {
        let mut listings = chunks
            .iter()
            .map(|chunk| from_text(&chunk.text))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Creating {} personalized listings...", listings.len());

        for listing in &mut listings {
            let prompt = build_personalization_prompt(buyer_preferences, listing.description());
            match self.augment(&prompt).await {
                Some(augmented) => listing.set_augmented_description(augmented),
                None => {
                    warn!(
                        "Max retries reached for listing in {}; keeping the original description",
                        listing.neighborhood()
                    );
                    let original = listing.description().to_string();
                    listing.set_augmented_description(original);
                }
            }
        }

        Ok(listings)
    }

    /// Calls the gateway until it returns the augmented description or the
    /// attempt budget runs out.
    async fn augment(&self, prompt: &str) -> Option<String> {
        let schema = augmented_description_schema();
        let request = CompletionRequest::new(PERSONALIZATION_SYSTEM, prompt)
            .with_examples(PERSONALIZATION_FEW_SHOT_EXAMPLE)
            .with_schema(&schema);

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self.gateway.complete_json(request).await;
            if let Some(augmented) = extract_augmented_description(&response) {
                return Some(augmented);
            }

            warn!("Personalization attempt {attempt}/{MAX_ATTEMPTS} returned no augmented description");
            if attempt < MAX_ATTEMPTS {
                self.sleeper.sleep(RETRY_DELAY).await;
            }
        }

        None
    }
}

fn extract_augmented_description(response: &JsonObject) -> Option<String> {
    match response.get(AUGMENTED_DESCRIPTION_KEY) {
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    }
}
