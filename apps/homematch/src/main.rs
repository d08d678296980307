mod clock;
mod config;
mod errors;
mod generation;
mod listing;
mod llm_client;
mod matcher;
mod personalization;
mod preferences;
mod search;
mod store;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::generation::ListingGenerator;
use crate::llm_client::LlmClient;
use crate::matcher::HomeMatcher;
use crate::preferences::BuyerPreferences;
use crate::store::LocalVectorIndex;

const USAGE: &str = "Usage: homematch [OPENAI_API_KEY] (or set the OPENAI_API_KEY environment variable)";

#[tokio::main]
async fn main() -> ExitCode {
    // Credential from argv[1] first, then the environment.
    let config = match Config::from_env(std::env::args().nth(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("HomeMatch failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    info!("Starting HomeMatch v{}", env!("CARGO_PKG_VERSION"));

    let llm = LlmClient::new(config.gateway())?;
    info!(
        "Model gateway initialized (chat: {}, embeddings: {})",
        config.chat_model, config.embedding_model
    );

    let index = LocalVectorIndex::new(&config.listings_db_path);
    info!("Vector index at {:?}", index.root());

    let preferences = match &config.buyer_preferences_path {
        Some(path) => BuyerPreferences::load(path).await?,
        None => BuyerPreferences::default(),
    };
    info!("Buyer preferences: {} answers", preferences.answers().len());

    let matcher = HomeMatcher::from_config(&config, Arc::new(llm), Arc::new(index));
    matcher.run(&preferences).await?;

    // Summary read back from the written files.
    let raw = ListingGenerator::load_raw_listings(&config.raw_listings_path()).await?;
    let matches = HomeMatcher::load_matches(matcher.output_path()).await?;
    info!(
        "Raw dump holds {} generated entries; {} personalized listings saved to {:?}",
        raw.len(),
        matches.len(),
        matcher.output_path()
    );
    Ok(())
}
