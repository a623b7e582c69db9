//! Hybrid query engine: dense retrieval fused with sparse scoring
//!
//! Dense candidates come from the vector store (cosine distance); each is
//! then scored lexically and the two signals fuse into one hybrid score.
//! Ranking is fully deterministic: descending hybrid score with ties
//! broken by ascending chunk id. A missing or unreachable backend
//! degrades to an explicit `Unavailable` status so callers can tell
//! "no relevant content" apart from "system down".

mod sparse;

pub use sparse::{SparseScore, SparseScorer};

use crate::config::RetrievalConfig;
use crate::embedding::BatchEmbedder;
use crate::error::{MindsongError, Result};
use crate::store::{CollectionCatalog, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// One ranked result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub dense_score: f32,
    pub sparse_score: f32,
    pub hybrid_score: f32,
}

/// Whether results came from a live index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SearchStatus {
    Ready,
    Unavailable { reason: String },
}

/// Search outcome; empty results with `Unavailable` status means the
/// backend could not be consulted, not that nothing matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    fn ready(results: Vec<SearchHit>) -> Self {
        Self {
            status: SearchStatus::Ready,
            results,
        }
    }

    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            status: SearchStatus::Unavailable {
                reason: reason.into(),
            },
            results: Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, SearchStatus::Unavailable { .. })
    }
}

/// Hybrid searcher over one aliased document collection
pub struct QueryEngine {
    embedder: BatchEmbedder,
    catalog: Arc<dyn CollectionCatalog>,
    alias: String,
    config: RetrievalConfig,
    scorer: SparseScorer,
}

impl QueryEngine {
    /// Create a new query engine.
    ///
    /// Fails fast if the aliased collection already exists and is pinned
    /// to a different embedder identity; querying it would produce garbled
    /// similarity math, never a useful ranking.
    pub fn new(
        embedder: BatchEmbedder,
        catalog: Arc<dyn CollectionCatalog>,
        alias: impl Into<String>,
        config: RetrievalConfig,
    ) -> Result<Self> {
        let scorer = SparseScorer::new(&config)?;
        let engine = Self {
            embedder,
            catalog,
            alias: alias.into(),
            config,
            scorer,
        };

        if let Some(name) = engine.catalog.resolve_alias(&engine.alias)? {
            let store = engine.catalog.collection(&name)?;
            engine.check_identity(store.as_ref())?;
        }

        Ok(engine)
    }

    fn check_identity(&self, store: &dyn VectorStore) -> Result<()> {
        if let Some(pinned) = store.identity()? {
            let ours = self.embedder.identity();
            if pinned != ours {
                return Err(MindsongError::DimensionMismatch {
                    collection: store.name().to_string(),
                    pinned_model: pinned.model,
                    pinned_dim: pinned.dimension,
                    actual_model: ours.model,
                    actual_dim: ours.dimension,
                });
            }
        }
        Ok(())
    }

    /// Hybrid search for the top `n_results` chunks.
    ///
    /// `file_filter` retains only candidates whose source path contains
    /// the given substring.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        file_filter: Option<&str>,
    ) -> Result<SearchResponse> {
        if query.trim().is_empty() || n_results == 0 {
            return Ok(SearchResponse::ready(Vec::new()));
        }

        let store = match self.catalog.resolve_alias(&self.alias)? {
            Some(name) => self.catalog.collection(&name)?,
            None => {
                return Ok(SearchResponse::unavailable(format!(
                    "not indexed: alias '{}' has no collection",
                    self.alias
                )))
            }
        };
        self.check_identity(store.as_ref())?;

        let embedding = match self.embedder.embed_one(query).await {
            Ok(embedding) => embedding,
            Err(e) if e.is_transient() => {
                warn!("Embedding backend unavailable for search: {}", e);
                return Ok(SearchResponse::unavailable(format!(
                    "embedding backend unavailable: {}",
                    e
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let k = n_results.saturating_mul(self.config.candidate_multiplier);
        let hits = match store.query(&embedding, k) {
            Ok(hits) => hits,
            Err(MindsongError::BackendUnavailable(reason)) => {
                warn!("Vector store unavailable for search: {}", reason);
                return Ok(SearchResponse::unavailable(reason));
            }
            Err(e) => return Err(e),
        };

        let mut results: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| match file_filter {
                Some(filter) => hit
                    .metadata
                    .get("source_path")
                    .map(|p| p.contains(filter))
                    .unwrap_or(false),
                None => true,
            })
            .map(|hit| {
                let dense_score = 1.0 - hit.distance;
                let sparse = self.scorer.score(query, &hit.text);
                let hybrid_score = self.config.dense_weight * dense_score
                    + self.config.sparse_weight * sparse.combined;
                SearchHit {
                    chunk_id: hit.id,
                    text: hit.text,
                    metadata: hit.metadata,
                    dense_score,
                    sparse_score: sparse.combined,
                    hybrid_score,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.hybrid_score
                .total_cmp(&a.hybrid_score)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(n_results);

        Ok(SearchResponse::ready(results))
    }
}
