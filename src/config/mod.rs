//! Configuration management for the grounding engine
//!
//! Handles loading, validation, and environment overrides for every tunable
//! the engine exposes: storage paths and collection names, embedding model
//! and batching, chunk geometry, indexing filters, retrieval weights, and
//! cache TTL/threshold.

use crate::error::{MindsongError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub indexing: IndexingConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration: where the store, lock file, and manifest live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Alias of the active document collection; rebuilds swap this alias
    /// to a fresh generation on success
    pub docs_alias: String,
    /// Cache namespace collection (no aliasing; entries are overwritten in
    /// place by id)
    pub cache_collection: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    /// Upper bound on concurrently in-flight embedding batches
    pub max_concurrent_batches: usize,
    /// Retry attempts for transient embedding failures
    pub max_retries: usize,
    /// Base backoff between retries; doubles per attempt
    pub retry_backoff_ms: u64,
    /// Per-attempt timeout for one embedding batch
    pub request_timeout_secs: u64,
}

/// Chunk geometry: overlapping windows over the source text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

/// Indexing filters applied while walking the document tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File extensions eligible for indexing (without the leading dot)
    pub allow_exts: BTreeSet<String>,
    /// Directory names pruned before descent
    pub skip_dirs: BTreeSet<String>,
    /// Files larger than this many bytes are skipped
    pub max_file_size: u64,
}

/// Retrieval weights and sparse-scoring constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Dense candidates fetched per result requested
    pub candidate_multiplier: usize,
    pub dense_weight: f32,
    pub sparse_weight: f32,
    pub bm25_weight: f32,
    pub keyword_weight: f32,
    pub bm25_k1: f32,
    pub bm25_b: f32,
    /// Assumed average document length in terms. A fixed constant rather
    /// than a corpus-measured value; kept for fidelity to the observed
    /// scoring scheme.
    pub avg_doc_len: f32,
}

/// Semantic cache tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_hours: u64,
    pub similarity_threshold: f32,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_similarity_threshold: Option<f32>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MindsongError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MindsongError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| MindsongError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) {
        if let Some(overrides) = self.profiles.get(profile).cloned() {
            if let Some(model) = overrides.embedding_model {
                self.embedding.model = model;
            }
            if let Some(ttl) = overrides.cache_ttl_hours {
                self.cache.ttl_hours = ttl;
            }
            if let Some(threshold) = overrides.cache_similarity_threshold {
                self.cache.similarity_threshold = threshold;
            }
        }
    }

    /// Apply environment variable overrides
    /// Environment variables in format: MINDSONG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("MINDSONG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "EMBEDDING__BATCH_SIZE" => {
                self.embedding.batch_size = Self::parse_env(path, value)?;
            }
            "CHUNKING__CHUNK_SIZE" => {
                self.chunking.chunk_size = Self::parse_env(path, value)?;
            }
            "CHUNKING__OVERLAP" => {
                self.chunking.overlap = Self::parse_env(path, value)?;
            }
            "CACHE__TTL_HOURS" => {
                self.cache.ttl_hours = Self::parse_env(path, value)?;
            }
            "CACHE__SIMILARITY_THRESHOLD" => {
                self.cache.similarity_threshold = Self::parse_env(path, value)?;
            }
            "STORAGE__DOCS_ALIAS" => {
                self.storage.docs_alias = value.to_string();
            }
            "STORAGE__CACHE_COLLECTION" => {
                self.storage.cache_collection = value.to_string();
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
        value.parse().map_err(|_| MindsongError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MindsongError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("mindsong").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| MindsongError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".mindsong"))
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.mindsong");

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir,
                docs_alias: "mindsong_docs".to_string(),
                cache_collection: "roxy_cache".to_string(),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
                max_concurrent_batches: 4,
                max_retries: 3,
                retry_backoff_ms: 250,
                request_timeout_secs: 60,
            },
            chunking: ChunkingConfig {
                chunk_size: 1000,
                overlap: 200,
            },
            indexing: IndexingConfig {
                allow_exts: ["md", "txt", "rst", "py", "rs", "js", "ts", "toml", "yaml", "json"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                skip_dirs: [
                    ".git",
                    "target",
                    "node_modules",
                    "__pycache__",
                    ".venv",
                    "dist",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                max_file_size: 1_048_576,
            },
            retrieval: RetrievalConfig {
                candidate_multiplier: 2,
                dense_weight: 0.6,
                sparse_weight: 0.4,
                bm25_weight: 0.6,
                keyword_weight: 0.4,
                bm25_k1: 1.5,
                bm25_b: 0.75,
                avg_doc_len: 256.0,
            },
            cache: CacheConfig {
                ttl_hours: 24,
                similarity_threshold: 0.85,
            },
            profiles: HashMap::new(),
        }
    }
}
