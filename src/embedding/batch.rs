/// Batched embedding with bounded concurrency and transient-failure retry
use super::{EmbedderIdentity, EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Wraps an [`EmbeddingProvider`] with the concurrency and failure policy
/// every caller needs: texts are embedded in batches of `batch_size`, at
/// most `max_concurrent_batches` batches are in flight at once, each
/// attempt carries a timeout, and transient failures are retried with
/// bounded exponential backoff. Permanent failures (bad input, dimension
/// mismatch) are never retried.
///
/// Cloning shares the provider and the concurrency limit.
#[derive(Clone)]
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    semaphore: Arc<Semaphore>,
    batch_size: usize,
    max_attempts: usize,
    retry_backoff: Duration,
    request_timeout: Duration,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_batches)),
            batch_size: config.batch_size,
            max_attempts: config.max_retries.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    pub fn provider(&self) -> Arc<dyn EmbeddingProvider> {
        self.provider.clone()
    }

    pub fn identity(&self) -> EmbedderIdentity {
        self.provider.identity()
    }

    /// Embed a single text with the same retry policy as batches.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_texts(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))
    }

    /// Embed all texts, preserving input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut handles = Vec::new();
        for batch in texts.chunks(self.batch_size) {
            let batch = batch.to_vec();
            let semaphore = self.semaphore.clone();
            let provider = self.provider.clone();
            let max_attempts = self.max_attempts;
            let backoff = self.retry_backoff;
            let timeout = self.request_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| EmbeddingError::Backend(format!("semaphore closed: {}", e)))?;
                embed_with_retry(provider, batch, max_attempts, backoff, timeout).await
            }));
        }

        let mut out = Vec::with_capacity(texts.len());
        let mut first_error = None;
        for handle in handles {
            let joined = handle
                .await
                .map_err(|e| EmbeddingError::Backend(format!("embedding task failed: {}", e)));
            match joined {
                Ok(Ok(vectors)) => out.extend(vectors),
                Ok(Err(e)) | Err(e) => {
                    // Keep draining so sibling tasks finish before we report.
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}

async fn embed_with_retry(
    provider: Arc<dyn EmbeddingProvider>,
    texts: Vec<String>,
    max_attempts: usize,
    backoff: Duration,
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;

        let provider = provider.clone();
        let batch = texts.clone();
        let call = tokio::task::spawn_blocking(move || provider.embed_batch(&batch));

        let result = match tokio::time::timeout(timeout, call).await {
            Err(_) => Err(EmbeddingError::Backend(format!(
                "embedding attempt timed out after {:?}",
                timeout
            ))),
            Ok(Err(join_err)) => Err(EmbeddingError::Backend(format!(
                "embedding task failed: {}",
                join_err
            ))),
            Ok(Ok(result)) => result,
        };

        match result {
            Ok(vectors) => {
                if attempt > 1 {
                    debug!("Embedding batch succeeded on attempt {}", attempt);
                }
                return Ok(vectors);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff * (1u32 << (attempt - 1).min(8) as u32);
                warn!(
                    "Transient embedding failure (attempt {}/{}): {}; retrying in {:?}",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
