/// Embedding provider trait and FastEmbed implementation
use crate::error::MindsongError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Embedding backend unreachable: {0}")]
    Backend(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbeddingError {
    /// Transient failures are retried with backoff; everything else is
    /// permanent and surfaces immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Backend(_))
    }
}

impl From<EmbeddingError> for MindsongError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::Backend(msg) => MindsongError::BackendUnavailable(msg),
            EmbeddingError::InitializationError(msg) => MindsongError::Config(msg),
            EmbeddingError::DimensionMismatch { expected, actual } => MindsongError::Config(
                format!("provider produced {}d vectors, expected {}d", actual, expected),
            ),
            other => MindsongError::Other(anyhow::Error::new(other)),
        }
    }
}

/// The identity a collection is pinned to: one model, one dimension.
///
/// Two identities are compatible only if both fields match; mixing
/// embedders against one persisted collection is an illegal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedderIdentity {
    pub model: String,
    pub dimension: usize,
}

impl std::fmt::Display for EmbedderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}d)", self.model, self.dimension)
    }
}

/// Trait for embedding providers
///
/// Allows abstraction over different embedding backends (FastEmbed, remote
/// APIs, test stubs). Output dimension is fixed per provider instance.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Generate embeddings for multiple texts (batched for efficiency)
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Model name and dimension as one pinnable identity
    fn identity(&self) -> EmbedderIdentity {
        EmbedderIdentity {
            model: self.model_name().to_string(),
            dimension: self.dimension(),
        }
    }
}

/// FastEmbed provider for local embedding generation
///
/// Models are downloaded on-demand to `~/.cache/huggingface/` on first use;
/// the smallest (all-MiniLM-L6-v2, 384 dims) is ~90MB.
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Create a new FastEmbed provider with the specified model
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let embedding_model = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        let dimension = match embedding_model {
            EmbeddingModel::BGEBaseENV15 => 768,
            _ => 384,
        };

        tracing::info!(
            "Initializing embedding model: {} ({}d, downloaded on first use if not cached)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);

        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    /// Create provider with default model (all-MiniLM-L6-v2)
    pub fn with_default_model() -> Result<Self, EmbeddingError> {
        Self::new("all-MiniLM-L6-v2")
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embeddings = self
            .model
            .embed(vec![text.to_string()], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        if texts.iter().any(|t| t.is_empty()) {
            return Err(EmbeddingError::InvalidInput(
                "Batch contains an empty text".to_string(),
            ));
        }

        let embeddings = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
