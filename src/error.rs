use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the mindsong engine
///
/// Variants fall into four classes: configuration errors (fatal at startup
/// or first use), backend availability (search and cache reads degrade
/// instead of propagating these), fatal indexing errors (abort the run),
/// and infrastructure wrappers. Per-file indexing failures are not errors
/// at this level; they are collected in `IndexReport::errors`.
#[derive(Error, Debug)]
pub enum MindsongError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Embedder identity does not match what the collection was built with
    #[error(
        "Embedding dimension mismatch for collection '{collection}': \
         pinned to {pinned_model} ({pinned_dim}d), got {actual_model} ({actual_dim}d)"
    )]
    DimensionMismatch {
        collection: String,
        pinned_model: String,
        pinned_dim: usize,
        actual_model: String,
        actual_dim: usize,
    },

    /// Vector store or embedding backend unreachable
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Indexing cannot proceed at all (missing root, unwritable manifest)
    #[error("Fatal index error: {0}")]
    FatalIndex(String),

    /// Another index run holds the writer lock
    #[error("Index run already in progress (lock held at {path})")]
    IndexLocked { path: PathBuf },

    /// Operation name not present in the handler registry
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MindsongError {
    /// Whether this error belongs to the configuration class.
    ///
    /// Config-class errors must never be masked by degraded results;
    /// similarity math over a mispinned store is meaningless.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            MindsongError::Config(_)
                | MindsongError::ConfigValidation { .. }
                | MindsongError::ConfigNotFound { .. }
                | MindsongError::InvalidConfigValue { .. }
                | MindsongError::DimensionMismatch { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for mindsong operations
pub type Result<T> = std::result::Result<T, MindsongError>;
