//! Model Gateway: the single point of entry for all completion and
//! embedding calls in HomeMatch.
//!
//! No other module talks to the model provider directly. Every call shares
//! one process-wide admission gate of `MAX_CONCURRENT_CALLS` permits.
//!
//! Failure contract: rate limits are retried transparently with a fixed
//! backoff; every other failure degrades to an empty result, which callers
//! treat as "no data".
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::clock::{Sleeper, TokioSleeper};

pub mod prompts;

/// Maximum simultaneous in-flight calls across the process.
pub const MAX_CONCURRENT_CALLS: usize = 4;
/// Fixed delay between rate-limited attempts. Never grows.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);
const MAX_OUTPUT_TOKENS: u32 = 4096;
const OUTPUT_TOKENS_SAFETY_GAP: u32 = 100;
const TEMPERATURE: f32 = 0.2;

/// A parsed JSON object returned by the gateway. Empty means failure.
pub type JsonObject = Map<String, Value>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("Model returned empty content")]
    EmptyContent,

    #[error("Embedding response carried no vector")]
    MissingEmbedding,

    #[error("Call limiter closed")]
    LimiterClosed,
}

/// Explicit gateway settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            chat_model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS - OUTPUT_TOKENS_SAFETY_GAP,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// One structured completion request.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub few_shot_examples: Option<&'a str>,
    pub output_schema: Option<&'a Value>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(system_prompt: &'a str, user_prompt: &'a str) -> Self {
        Self {
            system_prompt,
            user_prompt,
            few_shot_examples: None,
            output_schema: None,
        }
    }

    pub fn with_examples(mut self, few_shot_examples: &'a str) -> Self {
        self.few_shot_examples = Some(few_shot_examples);
        self
    }

    pub fn with_schema(mut self, output_schema: &'a Value) -> Self {
        self.output_schema = Some(output_schema);
        self
    }
}

/// The gateway trait. Pipeline stages hold an `Arc<dyn ModelGateway>` so
/// tests can substitute scripted responses.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Returns the parsed JSON object, or an empty object on any
    /// unrecoverable failure.
    async fn complete_json(&self, request: CompletionRequest<'_>) -> JsonObject;

    /// Returns the embedding vector, or an empty vector for empty input or
    /// on unrecoverable failure.
    async fn embed(&self, text: &str) -> Vec<f32>;

    /// Identifier of the embedding model, stamped on stored collections.
    fn embedding_model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// OpenAI-compatible gateway. Clones share the HTTP pool and the call limiter.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: Arc<GatewayConfig>,
    permits: Arc<Semaphore>,
    sleeper: Arc<dyn Sleeper>,
}

impl LlmClient {
    pub fn new(config: GatewayConfig) -> Result<Self, LlmError> {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    /// Like `new`, with the rate-limit backoff waited out on `sleeper`.
    pub fn with_sleeper(config: GatewayConfig, sleeper: Arc<dyn Sleeper>) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_CALLS)),
            sleeper,
        })
    }

    pub fn chat_model(&self) -> &str {
        &self.config.chat_model
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Chat completion returning the raw text payload.
    async fn chat(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.config.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_output_tokens,
        };
        let url = self.endpoint("chat/completions");
        let (this, url, body) = (self, url.as_str(), &body);

        retry_on_rate_limit(self.sleeper.as_ref(), RATE_LIMIT_BACKOFF, move || {
            this.send_chat(url, body)
        })
        .await
    }

    async fn send_chat(&self, url: &str, body: &ChatRequest<'_>) -> Result<String, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::LimiterClosed)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let parsed: ChatResponse = response.json().await?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Completion succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }

    async fn embedding(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: text,
        };
        let url = self.endpoint("embeddings");
        let (this, url, body) = (self, url.as_str(), &body);

        retry_on_rate_limit(self.sleeper.as_ref(), RATE_LIMIT_BACKOFF, move || {
            this.send_embedding(url, body)
        })
        .await
    }

    async fn send_embedding(
        &self,
        url: &str,
        body: &EmbeddingRequest<'_>,
    ) -> Result<Vec<f32>, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::LimiterClosed)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let parsed: EmbeddingResponse = response.json().await?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::MissingEmbedding)
    }
}

#[async_trait]
impl ModelGateway for LlmClient {
    async fn complete_json(&self, request: CompletionRequest<'_>) -> JsonObject {
        if request.user_prompt.trim().is_empty() {
            warn!("Completion skipped: user prompt is empty");
            return JsonObject::new();
        }
        if request.system_prompt.trim().is_empty() {
            warn!("System prompt is empty");
        }

        let user_message = prompts::build_user_message(&request);
        debug!("Calling {} ({} prompt chars)", self.chat_model(), user_message.len());

        match self.chat(request.system_prompt, &user_message).await {
            Ok(text) => parse_json_object(&text),
            Err(e) => {
                error!("Completion call failed: {e}");
                JsonObject::new()
            }
        }
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return Vec::new();
        }

        match self.embedding(text).await {
            Ok(vector) => vector,
            Err(e) => {
                error!("Embedding call failed: {e}");
                Vec::new()
            }
        }
    }

    fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }
}

/// Maps 429 to `RateLimited` and any other non-success status to `Api`.
async fn ensure_success(response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ProviderError>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::RateLimited { message });
    }

    Err(LlmError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Re-issues `op` after a fixed `backoff` for as long as it reports a rate
/// limit. Any other outcome is returned as-is.
pub(crate) async fn retry_on_rate_limit<T, F, Fut>(
    sleeper: &dyn Sleeper,
    backoff: Duration,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt: u64 = 0;
    loop {
        match op().await {
            Err(LlmError::RateLimited { message }) => {
                attempt += 1;
                warn!(
                    "Rate limited (attempt {attempt}), retrying after {}s: {message}",
                    backoff.as_secs()
                );
                sleeper.sleep(backoff).await;
            }
            outcome => return outcome,
        }
    }
}

/// Strips fences and parses the payload; anything but a JSON object yields
/// an empty object.
pub fn parse_json_object(text: &str) -> JsonObject {
    let payload = strip_json_fences(text);
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!("Expected a JSON object, got: {other}; raw payload: {text}");
            JsonObject::new()
        }
        Err(e) => {
            warn!("Failed to decode JSON ({e}); raw payload: {text}");
            JsonObject::new()
        }
    }
}

/// Opening fences, tagged variants first. Closing fences are the first three chars.
const FENCES: [&str; 4] = ["```json", "'''json", "```", "'''"];

/// Strips ```json / ``` / '''json / ''' fences from model output.
///
/// Only a fence at the start of a line opens a block, so fence characters
/// inside an unfenced payload are left alone. Text before the opening fence
/// and after the closing fence is discarded.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some((start, fence)) = line_starts(text).find_map(|i| {
        FENCES
            .into_iter()
            .find(|fence| text[i..].starts_with(fence))
            .map(|fence| (i, fence))
    }) else {
        return text;
    };

    let body = &text[start + fence.len()..];
    let closing = &fence[..3];
    let body = match line_starts(body).find(|&i| i > 0 && body[i..].starts_with(closing)) {
        Some(end) => &body[..end],
        None => {
            let body = body.trim_end();
            body.strip_suffix(closing).unwrap_or(body)
        }
    };
    body.trim()
}

/// Byte offsets at which each line of `text` begins.
fn line_starts(text: &str) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(0).chain(text.match_indices('\n').map(|(i, _)| i + 1))
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Scripted gateway: pops completion responses in order (empty object once
    /// exhausted) and embeds text with a caller-supplied function.
    pub struct ScriptedGateway {
        responses: Mutex<VecDeque<JsonObject>>,
        pub prompts: Mutex<Vec<String>>,
        embed_fn: Box<dyn Fn(&str) -> Vec<f32> + Send + Sync>,
        model: String,
    }

    impl ScriptedGateway {
        pub fn new(responses: Vec<JsonObject>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
                embed_fn: Box::new(|text| vec![text.len() as f32, 1.0]),
                model: "test-embedding".to_string(),
            }
        }

        pub fn with_embedder(
            mut self,
            embed_fn: impl Fn(&str) -> Vec<f32> + Send + Sync + 'static,
        ) -> Self {
            self.embed_fn = Box::new(embed_fn);
            self
        }

        pub fn with_model(mut self, model: &str) -> Self {
            self.model = model.to_string();
            self
        }

        pub fn call_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelGateway for ScriptedGateway {
        async fn complete_json(&self, request: CompletionRequest<'_>) -> JsonObject {
            self.prompts
                .lock()
                .unwrap()
                .push(request.user_prompt.to_string());
            self.responses.lock().unwrap().pop_front().unwrap_or_default()
        }

        async fn embed(&self, text: &str) -> Vec<f32> {
            if text.is_empty() {
                return Vec::new();
            }
            (self.embed_fn)(text)
        }

        fn embedding_model(&self) -> &str {
            &self.model
        }
    }

    /// Convenience: builds a `JsonObject` from a `json!` literal.
    pub fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }
}
