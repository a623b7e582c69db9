use crate::config::Config;
use crate::error::{MindsongError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_cache(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MindsongError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory path cannot be empty",
            ));
        }

        if config.storage.docs_alias.is_empty() {
            errors.push(ValidationError::new(
                "storage.docs_alias",
                "Document alias cannot be empty",
            ));
        }

        if config.storage.cache_collection.is_empty() {
            errors.push(ValidationError::new(
                "storage.cache_collection",
                "Cache collection name cannot be empty",
            ));
        }

        if config.storage.docs_alias == config.storage.cache_collection {
            errors.push(ValidationError::new(
                "storage.cache_collection",
                "Cache collection must not share a name with the document alias",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_concurrent_batches == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent_batches",
                "Concurrent batch limit must be greater than 0",
            ));
        }

        if config.embedding.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.request_timeout_secs",
                "Request timeout must be greater than 0",
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        if config.chunking.overlap >= config.chunking.chunk_size {
            errors.push(ValidationError::new(
                "chunking.overlap",
                format!(
                    "Overlap ({}) must be smaller than chunk size ({})",
                    config.chunking.overlap, config.chunking.chunk_size
                ),
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.indexing.allow_exts.is_empty() {
            errors.push(ValidationError::new(
                "indexing.allow_exts",
                "At least one allowed extension is required",
            ));
        }

        if config.indexing.max_file_size == 0 {
            errors.push(ValidationError::new(
                "indexing.max_file_size",
                "Maximum file size must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "retrieval.candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        for (path, weight) in [
            ("retrieval.dense_weight", config.retrieval.dense_weight),
            ("retrieval.sparse_weight", config.retrieval.sparse_weight),
            ("retrieval.bm25_weight", config.retrieval.bm25_weight),
            ("retrieval.keyword_weight", config.retrieval.keyword_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be between 0.0 and 1.0, got {}", weight),
                ));
            }
        }

        if config.retrieval.bm25_k1 <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.bm25_k1",
                "k1 must be positive",
            ));
        }

        if !(0.0..=1.0).contains(&config.retrieval.bm25_b) {
            errors.push(ValidationError::new(
                "retrieval.bm25_b",
                format!("b must be between 0.0 and 1.0, got {}", config.retrieval.bm25_b),
            ));
        }

        if config.retrieval.avg_doc_len <= 0.0 {
            errors.push(ValidationError::new(
                "retrieval.avg_doc_len",
                "Average document length must be positive",
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.cache.ttl_hours == 0 {
            errors.push(ValidationError::new(
                "cache.ttl_hours",
                "Cache TTL must be greater than 0",
            ));
        }

        let threshold = config.cache.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "cache.similarity_threshold",
                format!("Threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }
    }
}
