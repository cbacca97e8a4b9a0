//! Embedding provider implementations.
//!
//! Concrete backends for the [`EmbeddingProvider`] trait defined in
//! `triage-core`:
//! - **[`GeminiProvider`]**: Generative Language `embedContent`, task type
//!   `RETRIEVAL_DOCUMENT`.
//! - **[`OpenAIProvider`]**: OpenAI `/v1/embeddings`.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed`.
//! - **`LocalProvider`**: fastembed in-process (feature
//!   `local-embeddings-fastembed`).
//! - **[`ZeroVectorProvider`]**: disabled provider, or a hosted provider
//!   whose credential is missing from the environment.
//!
//! Every provider truncates its input to `max_input_bytes` before
//! submission.
//!
//! # Retry Strategy
//!
//! The HTTP providers share one retry loop:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::warn;

use triage_core::embedding::{truncate_to_bytes, EmbeddingProvider, ZeroVectorProvider};

use crate::config::EmbeddingConfig;

pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const GEMINI_DEFAULT_MODEL: &str = "text-embedding-004";
const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "text-embedding-3-small";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
const OLLAMA_DEFAULT_MODEL: &str = "nomic-embed-text";

fn http_client(config: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to create embedding http client")
}

/// POST a JSON body, retrying rate limits, server errors, and transport
/// failures with exponential backoff.
async fn post_json_with_retry<F>(
    service: &str,
    max_retries: u32,
    mut request_builder: F,
) -> Result<serde_json::Value>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match request_builder().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("failed to decode {} response", service));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        service,
                        status,
                        body_text
                    ));
                    continue;
                }

                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("{} request failed: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} embedding failed after retries", service)))
}

fn parse_vector(values: &serde_json::Value, service: &str) -> Result<Vec<f32>> {
    let values = values
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Invalid {} response: missing embedding", service))?;
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|x| x as f32).ok_or_else(|| {
                anyhow::anyhow!("Invalid {} response: non-numeric embedding value {}", service, v)
            })
        })
        .collect()
}

// ============ Gemini Provider ============

/// Google Generative Language embeddings (`models/{model}:embedContent`).
pub struct GeminiProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    max_input_bytes: usize,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            dims: config.dims,
            url: config
                .url
                .as_deref()
                .unwrap_or(GEMINI_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_retries: config.max_retries,
            max_input_bytes: config.max_input_bytes,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": truncate_to_bytes(text, self.max_input_bytes) }] },
            "taskType": "RETRIEVAL_DOCUMENT",
            "title": "issue",
        });
        let endpoint = format!("{}/models/{}:embedContent", self.url, self.model);

        let json = post_json_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&endpoint)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        let values = json
            .get("embedding")
            .and_then(|e| e.get("values"))
            .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing embedding.values"))?;
        parse_vector(values, "Gemini")
    }
}

// ============ OpenAI Provider ============

/// OpenAI embeddings (`POST /v1/embeddings`). Requests `dimensions` so the
/// stored vectors match the configured width.
pub struct OpenAIProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    max_retries: u32,
    max_input_bytes: usize,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            dims: config.dims,
            url: config
                .url
                .as_deref()
                .unwrap_or(OPENAI_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            max_retries: config.max_retries,
            max_input_bytes: config.max_input_bytes,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": [truncate_to_bytes(text, self.max_input_bytes)],
            "dimensions": self.dims,
        });
        let endpoint = format!("{}/v1/embeddings", self.url);

        let json = post_json_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let first = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;
        parse_vector(first, "OpenAI")
    }
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires Ollama to be running with the model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
    max_input_bytes: usize,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string()),
            dims: config.dims,
            url: config
                .url
                .as_deref()
                .unwrap_or(OLLAMA_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            max_retries: config.max_retries,
            max_input_bytes: config.max_input_bytes,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": truncate_to_bytes(text, self.max_input_bytes),
        });
        let endpoint = format!("{}/api/embed", self.url);

        let json = post_json_with_retry("Ollama", self.max_retries, || {
            self.client.post(&endpoint).json(&body)
        })
        .await
        .with_context(|| format!("is Ollama running at {}?", self.url))?;

        let first = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .and_then(|e| e.first())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings"))?;
        parse_vector(first, "Ollama")
    }
}

// ============ Local Provider (fastembed) ============

/// Embedding provider that runs models in-process via fastembed.
///
/// The model is downloaded and loaded on the first call and reused after.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalProvider {
    model_name: String,
    dims: usize,
    max_input_bytes: usize,
    model: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "nomic-embed-text-v1.5".to_string());
        // Fail on unknown names at startup rather than on the first event.
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims: config.dims,
            max_input_bytes: config.max_input_bytes,
            model: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let text = truncate_to_bytes(text, self.max_input_bytes).to_string();
        let model_name = self.model_name.clone();
        let slot = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(
                    config_to_fastembed_model(&model_name)?,
                ))
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(model);
            }
            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("local embedding model not loaded"))?;
            let mut vectors = model
                .embed(vec![text], Some(1))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?;
            vectors
                .pop()
                .ok_or_else(|| anyhow::anyhow!("Local embedding returned no vector"))
        })
        .await?
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn degraded(
    config: &EmbeddingConfig,
    default_model: &str,
    key_env: &str,
) -> Arc<dyn EmbeddingProvider> {
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| default_model.to_string());
    warn!(
        provider = %config.provider,
        env = key_env,
        "embedding credential missing; using zero vectors, similarity scores will be 0"
    );
    Arc::new(ZeroVectorProvider::new(model, config.dims))
}

/// Create the [`EmbeddingProvider`] selected by configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`ZeroVectorProvider`] |
/// | `"gemini"` | [`GeminiProvider`] (`GOOGLE_API_KEY`) |
/// | `"openai"` | [`OpenAIProvider`] (`OPENAI_API_KEY`) |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings-fastembed`) |
///
/// A hosted provider whose key is absent degrades to zero vectors instead
/// of failing.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(ZeroVectorProvider::new("disabled", config.dims))),
        "gemini" => match env_key(GOOGLE_API_KEY_ENV) {
            Some(key) => Ok(Arc::new(GeminiProvider::new(config, key)?)),
            None => Ok(degraded(config, GEMINI_DEFAULT_MODEL, GOOGLE_API_KEY_ENV)),
        },
        "openai" => match env_key(OPENAI_API_KEY_ENV) {
            Some(key) => Ok(Arc::new(OpenAIProvider::new(config, key)?)),
            None => Ok(degraded(config, OPENAI_DEFAULT_MODEL, OPENAI_API_KEY_ENV)),
        },
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}
