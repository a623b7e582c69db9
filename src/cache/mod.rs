//! Semantic cache: similarity- and TTL-bounded query/response memory
//!
//! Entries are keyed by a content-addressed id over the normalized query
//! and canonical context, and found again by embedding similarity rather
//! than exact string match. A read is a hit only while both conditions
//! hold: nearest-neighbor similarity at or above the threshold, and age
//! strictly under the TTL. Both are re-evaluated on every read, so no
//! stale response survives past its TTL even if the sweep never runs.

use crate::embedding::BatchEmbedder;
use crate::error::{MindsongError, Result};
use crate::store::{ensure_identity, CollectionCatalog, VectorRecord, VectorStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a cache read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheLookup {
    pub hit: bool,
    pub response: Option<String>,
    pub similarity: Option<f32>,
}

impl CacheLookup {
    fn miss(similarity: Option<f32>) -> Self {
        Self {
            hit: false,
            response: None,
            similarity,
        }
    }
}

/// Similarity- and TTL-bounded cache over one collection
pub struct SemanticCache {
    embedder: BatchEmbedder,
    store: Arc<dyn VectorStore>,
    ttl: Duration,
    similarity_threshold: f32,
}

impl SemanticCache {
    /// Open the cache collection, pinning it to the embedder identity on
    /// first use. A collection pinned by a different embedder is rejected
    /// here, at construction.
    pub fn new(
        embedder: BatchEmbedder,
        catalog: Arc<dyn CollectionCatalog>,
        collection: &str,
        ttl_hours: u64,
        similarity_threshold: f32,
    ) -> Result<Self> {
        let store = catalog.collection(collection)?;
        ensure_identity(store.as_ref(), &embedder.identity())?;

        Ok(Self {
            embedder,
            store,
            ttl: Duration::hours(ttl_hours as i64),
            similarity_threshold,
        })
    }

    /// Deterministic entry id: normalized query plus canonical context.
    pub fn entry_id(query: &str, context: &BTreeMap<String, String>) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalize_query(query).as_bytes());
        hasher.update(&[0]);
        hasher.update(canonical_context(context)?.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Look up the nearest cached response for `query` + `context`.
    ///
    /// Backend unavailability degrades to a logged miss; the caller falls
    /// through to the full pipeline.
    pub async fn get(&self, query: &str, context: &BTreeMap<String, String>) -> Result<CacheLookup> {
        if query.trim().is_empty() {
            return Ok(CacheLookup::miss(None));
        }

        let composed = compose(query, context)?;
        let embedding = match self.embedder.embed_one(&composed).await {
            Ok(embedding) => embedding,
            Err(e) if e.is_transient() => {
                warn!("Embedding backend unavailable for cache get: {}", e);
                return Ok(CacheLookup::miss(None));
            }
            Err(e) => return Err(e.into()),
        };

        let hits = match self.store.query(&embedding, 1) {
            Ok(hits) => hits,
            Err(MindsongError::BackendUnavailable(reason)) => {
                warn!("Cache store unavailable: {}", reason);
                return Ok(CacheLookup::miss(None));
            }
            Err(e) => return Err(e),
        };

        let hit = match hits.into_iter().next() {
            Some(hit) => hit,
            None => return Ok(CacheLookup::miss(None)),
        };

        let similarity = 1.0 - hit.distance;
        if similarity < self.similarity_threshold {
            return Ok(CacheLookup::miss(Some(similarity)));
        }

        if !self.is_fresh(&hit.metadata) {
            // Matched but expired: drop it now rather than waiting for the
            // sweep. Best effort; the TTL check already protected the read.
            debug!("Evicting expired cache entry {}", hit.id);
            if let Err(e) = self.store.delete(&[hit.id.clone()]) {
                warn!("Failed to evict expired cache entry {}: {}", hit.id, e);
            }
            return Ok(CacheLookup::miss(Some(similarity)));
        }

        Ok(CacheLookup {
            hit: true,
            response: Some(hit.text),
            similarity: Some(similarity),
        })
    }

    /// Store a response, overwriting any prior entry for the same
    /// normalized query and context.
    pub async fn set(
        &self,
        query: &str,
        response: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<String> {
        let id = Self::entry_id(query, context)?;
        let composed = compose(query, context)?;
        let embedding = self.embedder.embed_one(&composed).await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("created_at".to_string(), Utc::now().to_rfc3339());
        metadata.insert("query".to_string(), normalize_query(query));
        metadata.insert("context".to_string(), canonical_context(context)?);

        self.store.upsert(&[VectorRecord {
            id: id.clone(),
            embedding,
            text: response.to_string(),
            metadata,
        }])?;

        Ok(id)
    }

    /// Remove every entry past its TTL, regardless of similarity.
    /// Housekeeping only; per-read checks already guarantee freshness.
    pub fn clear_expired(&self) -> Result<usize> {
        let mut expired = Vec::new();
        for entry in self.store.list()? {
            if !self.is_fresh(&entry.metadata) {
                expired.push(entry.id);
            }
        }

        if !expired.is_empty() {
            self.store.delete(&expired)?;
            debug!("Swept {} expired cache entries", expired.len());
        }
        Ok(expired.len())
    }

    fn is_fresh(&self, metadata: &BTreeMap<String, String>) -> bool {
        let created = metadata
            .get("created_at")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        match created {
            Some(created) => Utc::now().signed_duration_since(created) < self.ttl,
            // An entry without a readable timestamp is treated as expired.
            None => false,
        }
    }
}

/// Trim, lowercase, and collapse internal whitespace.
fn normalize_query(query: &str) -> String {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable JSON of the context map (BTreeMap keys are already sorted).
fn canonical_context(context: &BTreeMap<String, String>) -> Result<String> {
    serde_json::to_string(context).map_err(|e| MindsongError::Json {
        source: e,
        context: "Failed to canonicalize cache context".to_string(),
    })
}

/// The text both `get` and `set` embed: identical query+context pairs
/// embed identically, and context shifts the neighborhood.
fn compose(query: &str, context: &BTreeMap<String, String>) -> Result<String> {
    let normalized = normalize_query(query);
    if context.is_empty() {
        Ok(normalized)
    } else {
        Ok(format!("{}\n{}", normalized, canonical_context(context)?))
    }
}
