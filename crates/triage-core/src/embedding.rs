//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the degraded [`ZeroVectorProvider`], and pure helpers for
//! input truncation and vector serialization.
//!
//! Concrete HTTP providers (Gemini, OpenAI, Ollama) and the optional
//! local fastembed provider live in the `issue-triage` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// Byte budget applied to every text before it is submitted for embedding.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 8000;

/// Nominal dimension of the default embedding model (`text-embedding-004`).
pub const DEFAULT_DIMS: usize = 768;

/// Trait for embedding providers.
///
/// Implementations must be `Send + Sync`; one provider instance is shared
/// by every in-flight webhook delivery.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Embed a single text. Implementations truncate to their byte budget.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Provider used when no embedding credential is configured.
///
/// Always returns a zero vector of the nominal dimension. Zero vectors
/// score `0.0` against everything, so ranking degrades to "no similar
/// issues" rather than failing the pipeline.
pub struct ZeroVectorProvider {
    model: String,
    dims: usize,
}

impl ZeroVectorProvider {
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
        }
    }
}

impl Default for ZeroVectorProvider {
    fn default() -> Self {
        Self::new("disabled", DEFAULT_DIMS)
    }
}

#[async_trait]
impl EmbeddingProvider for ZeroVectorProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0; self.dims])
    }
}

/// Truncate `text` to at most `max_bytes` bytes without splitting a
/// UTF-8 character.
///
/// # Example
///
/// ```rust
/// use triage_core::embedding::truncate_to_bytes;
///
/// assert_eq!(truncate_to_bytes("héllo", 2), "h");
/// assert_eq!(truncate_to_bytes("short", 100), "short");
/// ```
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use triage_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values
/// from the byte slice.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "a".repeat(7999) + "é";
        let out = truncate_to_bytes(&text, DEFAULT_MAX_INPUT_BYTES);
        assert_eq!(out.len(), 7999);
        assert!(out.chars().all(|c| c == 'a'));
    }

    #[test]
    fn test_truncate_exact_budget() {
        let text = "x".repeat(DEFAULT_MAX_INPUT_BYTES + 10);
        assert_eq!(
            truncate_to_bytes(&text, DEFAULT_MAX_INPUT_BYTES).len(),
            DEFAULT_MAX_INPUT_BYTES
        );
    }

    #[tokio::test]
    async fn test_zero_provider_returns_nominal_dimension() {
        let provider = ZeroVectorProvider::default();
        let v = provider.embed("Crash on startup").await.unwrap();
        assert_eq!(v.len(), DEFAULT_DIMS);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_blob_decode_ignores_trailing_bytes() {
        let mut blob = vec_to_blob(&[0.5, -1.0]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![0.5, -1.0]);
    }
}
