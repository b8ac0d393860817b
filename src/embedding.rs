//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiProvider`]** — calls the OpenAI embeddings API with retry and backoff.
//!
//! Retries, rate limiting, and batching against the remote API are the
//! provider's responsibility; the core never retries on its own. The
//! ingestion pipeline drives [`embed_corpus`], which submits fixed-size
//! batches sequentially with a small inter-batch delay to stay under
//! remote rate limits.
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::EmbeddingConfig;

/// Trait for embedding providers.
///
/// Implementations are `Send + Sync` trait objects constructed once from
/// configuration and shared through the collaborators bundle.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one fixed-length vector per input, in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a corpus in fixed-size batches with a small inter-batch delay.
///
/// The delay is a throughput/latency trade-off to respect remote rate
/// limits, not a correctness mechanism. Returns one vector per input, in
/// input order.
pub async fn embed_corpus(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    batch_delay: Duration,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for (i, batch) in texts.chunks(batch_size).enumerate() {
        if i > 0 && !batch_delay.is_zero() {
            tokio::time::sleep(batch_delay).await;
        }
        let mut batch_vectors = provider
            .embed(batch)
            .await
            .with_context(|| format!("embedding batch {} failed", i + 1))?;
        if batch_vectors.len() != batch.len() {
            bail!(
                "embedding provider returned {} vectors for {} inputs",
                batch_vectors.len(),
                batch.len()
            );
        }
        vectors.append(&mut batch_vectors);
    }

    Ok(vectors)
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(config)?)),
        "disabled" => Ok(Box::new(DisabledProvider)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAiProvider {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create a new OpenAI provider from configuration.
    ///
    /// Fails when the configured model or dimensionality is missing.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .context("embedding.model must be set for the openai provider")?;
        let dims = config
            .dims
            .context("embedding.dims must be set for the openai provider")?;
        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut attempt: u32 = 0;
        loop {
            let result = client
                .post("https://api.openai.com/v1/embeddings")
                .bearer_auth(&api_key)
                .json(&body)
                .send()
                .await;

            let retryable = match result {
                Ok(resp) if resp.status().is_success() => {
                    let parsed: EmbeddingsResponse = resp
                        .json()
                        .await
                        .context("failed to parse OpenAI embeddings response")?;
                    let mut data = parsed.data;
                    data.sort_by_key(|d| d.index);
                    return Ok(data.into_iter().map(|d| d.embedding).collect());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if !retryable {
                        let text = resp.text().await.unwrap_or_default();
                        bail!(
                            "OpenAI embeddings request failed (HTTP {}): {}",
                            status,
                            text.chars().take(300).collect::<String>()
                        );
                    }
                    retryable
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(e).context("OpenAI embeddings request failed");
                    }
                    true
                }
            };

            if retryable {
                if attempt >= self.max_retries {
                    bail!(
                        "OpenAI embeddings request failed after {} retries",
                        self.max_retries
                    );
                }
                let backoff = Duration::from_secs(1 << attempt.min(5));
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_corpus_batches_sequentially() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let texts: Vec<String> = (0..25).map(|i| format!("text {}", i)).collect();
        let vectors = embed_corpus(&provider, &texts, 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(vectors.len(), 25);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_embed_corpus_empty_input() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
        };
        let vectors = embed_corpus(&provider, &[], 10, Duration::ZERO).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_errors() {
        let provider = DisabledProvider;
        let err = provider.embed(&["hi".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
