//! Shared fixtures for integration tests: deterministic embedding
//! providers (no model downloads) and corpus builders.

#![allow(dead_code)]

use mindsong::config::Config;
use mindsong::embedding::{EmbeddingError, EmbeddingProvider};
use std::collections::HashMap;
use std::path::Path;

/// Route engine tracing through the test harness; safe to call from
/// every test, only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Projects token hashes into a fixed-dimension bag-of-words vector.
/// Deterministic, similar texts land near each other, identical texts
/// embed identically.
pub struct TokenHashProvider {
    dimension: usize,
}

impl TokenHashProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl EmbeddingProvider for TokenHashProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        let mut v = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split_whitespace() {
            let hash = blake3_hash(token);
            let idx = (hash as usize) % self.dimension;
            v[idx] += 1.0;
        }
        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "token-hash"
    }
}

fn blake3_hash(token: &str) -> u64 {
    let hash = blake3::hash(token.as_bytes());
    let bytes = hash.as_bytes();
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Maps exact (already-normalized) texts to fixed vectors, so tests can
/// position candidates at precise similarities.
pub struct StaticProvider {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticProvider {
    pub fn new(dimension: usize, entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            dimension,
            vectors: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.clone()))
                .collect(),
        }
    }
}

impl EmbeddingProvider for StaticProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::InvalidInput(format!("Unmapped text: {:?}", text)))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "static-vectors"
    }
}

/// Always unreachable; every call is a transient backend failure. Claims
/// whatever identity it is given, so it can stand in for a provider whose
/// service went down after the store was built.
pub struct DownProvider {
    model_name: String,
    dimension: usize,
}

impl DownProvider {
    pub fn new(model_name: &str, dimension: usize) -> Self {
        Self {
            model_name: model_name.to_string(),
            dimension,
        }
    }
}

impl EmbeddingProvider for DownProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Backend("connection refused".to_string()))
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Backend("connection refused".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Config pointed at a temp data dir, with fast retry backoff.
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = data_dir.to_path_buf();
    config.embedding.retry_backoff_ms = 1;
    config.embedding.request_timeout_secs = 5;
    config
}

pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// ASCII filler of exactly `len` bytes, seeded with searchable words and
/// free of paragraph breaks, so window counts follow stride arithmetic.
pub fn filler_text(seed: &str, len: usize) -> String {
    let sentence = format!("{} notes for the team knowledge base. ", seed);
    let mut text = sentence.repeat(len / sentence.len() + 1);
    text.truncate(len);
    text
}

/// The three-file corpus used by the indexing scenario: 1,500 / 300 /
/// 5,000 characters, which chunk to 2 / 1 / 6 windows at the default
/// geometry.
pub fn write_scenario_corpus(root: &Path) {
    write_file(root, "A.md", &filler_text("onboarding", 1500));
    write_file(root, "B.md", &filler_text("deployment", 300));
    write_file(root, "C.md", &filler_text("architecture", 5000));
}
