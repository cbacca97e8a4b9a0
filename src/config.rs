//! TOML configuration parsing and validation.
//!
//! Secrets are never required in the file: the webhook secret, the
//! GitHub token, and the embedding provider keys are read from the
//! environment when the file leaves them unset.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use triage_core::embedding::{DEFAULT_DIMS, DEFAULT_MAX_INPUT_BYTES};

/// Environment variable consulted when `[webhook].secret` is absent.
pub const WEBHOOK_SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";
/// Environment variable consulted when `[github].token` is absent.
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub github: GithubConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/triage.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

/// Which neighbor source backs the pipeline.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Durable embedding index in SQLite.
    #[default]
    Persistent,
    /// No store; re-fetch and re-embed open issues per event.
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Persistent => "persistent",
            Mode::Live => "live",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            event_timeout_secs: default_event_timeout_secs(),
        }
    }
}

fn default_event_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WebhookConfig {
    /// Shared HMAC secret. `None` means trust mode: every delivery passes.
    #[serde(default)]
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL override (Ollama host, or a proxy in front of a hosted API).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            timeout_secs: default_embed_timeout_secs(),
            max_retries: default_max_retries(),
            max_input_bytes: default_max_input_bytes(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_dims() -> usize {
    DEFAULT_DIMS
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_input_bytes() -> usize {
    DEFAULT_MAX_INPUT_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// How many recent embeddings (one per issue) are scored per event.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            top_k: default_top_k(),
        }
    }
}

fn default_recent_limit() -> usize {
    50
}
fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    /// Number of open issues fetched per event.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Concurrent candidate embedding calls per event.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_window() -> usize {
    50
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: None,
            timeout_secs: default_github_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_github_timeout_secs() -> u64 {
    30
}

impl Config {
    /// All defaults: persistent mode, disabled embeddings, trust-mode webhooks.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig::default(),
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            webhook: WebhookConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            live: LiveConfig::default(),
            github: GithubConfig::default(),
        }
    }

    /// Fill unset secrets from the environment.
    fn apply_env(&mut self) {
        if self.webhook.secret.is_none() {
            self.webhook.secret = std::env::var(WEBHOOK_SECRET_ENV)
                .ok()
                .filter(|s| !s.is_empty());
        }
        if self.github.token.is_none() {
            self.github.token = std::env::var(GITHUB_TOKEN_ENV)
                .ok()
                .filter(|s| !s.is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.recent_limit == 0 {
            anyhow::bail!("retrieval.recent_limit must be >= 1");
        }
        if self.live.window == 0 {
            anyhow::bail!("live.window must be >= 1");
        }
        if self.live.concurrency == 0 {
            anyhow::bail!("live.concurrency must be >= 1");
        }
        if self.pipeline.event_timeout_secs == 0 {
            anyhow::bail!("pipeline.event_timeout_secs must be >= 1");
        }
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.max_input_bytes == 0 {
            anyhow::bail!("embedding.max_input_bytes must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "gemini" | "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, gemini, openai, ollama, or local.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env();
    config.validate()?;

    Ok(config)
}
