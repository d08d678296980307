use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::generator::DEFAULT_LISTING_COUNT;
use crate::llm_client::GatewayConfig;
use crate::search::DEFAULT_TOP_K;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Application configuration loaded from environment variables.
/// The API key may also be supplied on the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    /// Directory holding the persisted vector index collections.
    pub listings_db_path: PathBuf,
    /// Directory for the raw generation dump and the personalized output.
    pub resources_dir: PathBuf,
    pub listing_count: usize,
    pub search_top_k: usize,
    pub buyer_preferences_path: Option<PathBuf>,
    pub rust_log: String,
}

impl Config {
    /// Loads configuration. `cli_api_key` wins over `OPENAI_API_KEY`.
    pub fn from_env(cli_api_key: Option<String>) -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let openai_api_key = match cli_api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => key,
            None => require_env("OPENAI_API_KEY")?,
        };

        Ok(Config {
            openai_api_key,
            openai_base_url: env_or("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            chat_model: env_or("OPENAI_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            embedding_model: env_or("OPENAI_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            listings_db_path: PathBuf::from(env_or("LISTINGS_DB_PATH", "resources/listings.db")),
            resources_dir: PathBuf::from(env_or("RESOURCES_DIR", "resources")),
            listing_count: positive_env_or("LISTING_COUNT", DEFAULT_LISTING_COUNT)?,
            search_top_k: positive_env_or("SEARCH_TOP_K", DEFAULT_TOP_K)?,
            buyer_preferences_path: std::env::var("BUYER_PREFERENCES_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            rust_log: env_or("RUST_LOG", "info"),
        })
    }

    /// Gateway settings derived from this configuration.
    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            chat_model: self.chat_model.clone(),
            embedding_model: self.embedding_model.clone(),
            request_timeout: Duration::from_secs(120),
            ..GatewayConfig::default()
        }
    }

    pub fn raw_listings_path(&self) -> PathBuf {
        self.resources_dir.join("listings.json")
    }

    pub fn personalized_listings_path(&self) -> PathBuf {
        self.resources_dir.join("personalized_listings.json")
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn positive_env_or(key: &str, default: usize) -> Result<usize> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<usize>()
        .with_context(|| format!("{key} must be a positive integer"))?;
    anyhow::ensure!(value > 0, "{key} must be a positive integer");
    Ok(value)
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
