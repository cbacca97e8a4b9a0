//! Error taxonomy surfaced by the pipeline and the query side.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    /// Webhook signature missing or wrong while a secret is configured.
    #[error("signature verification failed: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Embedding provider or tracker call failed after its retries.
    #[error("{service} error: {message}")]
    ExternalService { service: String, message: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl TriageError {
    pub fn external(service: &str, err: impl std::fmt::Display) -> Self {
        TriageError::ExternalService {
            service: service.to_string(),
            message: err.to_string(),
        }
    }
}

pub type TriageResult<T> = std::result::Result<T, TriageError>;
