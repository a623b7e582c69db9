//! Engine facade wiring indexing, retrieval, and caching together
//!
//! One explicitly constructed instance owns the whole subsystem and is
//! passed by reference to every call site; there are no module-level
//! singletons to get-or-create. The embedding provider and the collection
//! catalog are injected, so deployments choose their own model and store
//! backend.

use crate::cache::{CacheLookup, SemanticCache};
use crate::config::{Config, ConfigValidator, IndexingConfig};
use crate::embedding::{BatchEmbedder, EmbeddingProvider};
use crate::error::Result;
use crate::index::{IndexManifest, IndexReport, Indexer};
use crate::query::{QueryEngine, SearchResponse};
use crate::store::CollectionCatalog;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// The knowledge-grounding engine: index, search, cache.
///
/// Search and cache calls are stateless and safe to issue concurrently;
/// indexing is single-writer and guarded by a file lock internally.
pub struct GroundingEngine {
    indexer: Indexer,
    query: QueryEngine,
    cache: SemanticCache,
    indexing_defaults: IndexingConfig,
}

impl GroundingEngine {
    /// Construct the engine over an injected provider and catalog.
    ///
    /// Validates the configuration and, where the document or cache
    /// collections already exist, their pinned embedder identities.
    /// A mismatch fails here rather than corrupting rankings later.
    pub fn new(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        catalog: Arc<dyn CollectionCatalog>,
    ) -> Result<Self> {
        ConfigValidator::validate(&config)?;

        let embedder = BatchEmbedder::new(provider, &config.embedding);
        let indexer = Indexer::new(embedder.clone(), catalog.clone(), &config)?;
        let query = QueryEngine::new(
            embedder.clone(),
            catalog.clone(),
            config.storage.docs_alias.clone(),
            config.retrieval.clone(),
        )?;
        let cache = SemanticCache::new(
            embedder,
            catalog,
            &config.storage.cache_collection,
            config.cache.ttl_hours,
            config.cache.similarity_threshold,
        )?;

        Ok(Self {
            indexer,
            query,
            cache,
            indexing_defaults: config.indexing,
        })
    }

    /// The filters index runs use when none are passed explicitly
    pub fn indexing_defaults(&self) -> &IndexingConfig {
        &self.indexing_defaults
    }

    /// Incrementally index `root` with the configured filters.
    pub async fn index(&self, root: &Path) -> Result<IndexReport> {
        self.indexer.index(root, &self.indexing_defaults).await
    }

    /// Incrementally index `root` with explicit filters.
    pub async fn index_with(&self, root: &Path, opts: &IndexingConfig) -> Result<IndexReport> {
        self.indexer.index(root, opts).await
    }

    /// Rebuild from scratch into a fresh generation, swapping the active
    /// alias only on success.
    pub async fn rebuild(&self, root: &Path) -> Result<IndexReport> {
        self.indexer.rebuild(root, &self.indexing_defaults).await
    }

    /// Rebuild with explicit filters.
    pub async fn rebuild_with(&self, root: &Path, opts: &IndexingConfig) -> Result<IndexReport> {
        self.indexer.rebuild(root, opts).await
    }

    /// Hybrid search over the active document collection.
    pub async fn search(
        &self,
        query: &str,
        n_results: usize,
        file_filter: Option<&str>,
    ) -> Result<SearchResponse> {
        self.query.search(query, n_results, file_filter).await
    }

    /// Semantic cache lookup.
    pub async fn cache_get(
        &self,
        query: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<CacheLookup> {
        self.cache.get(query, context).await
    }

    /// Store a response in the semantic cache; returns the entry id.
    pub async fn cache_set(
        &self,
        query: &str,
        response: &str,
        context: &BTreeMap<String, String>,
    ) -> Result<String> {
        self.cache.set(query, response, context).await
    }

    /// Sweep cache entries past their TTL; returns how many were removed.
    pub fn clear_expired_cache(&self) -> Result<usize> {
        self.cache.clear_expired()
    }

    /// The manifest written by the most recent completed index run.
    pub fn manifest(&self) -> Result<IndexManifest> {
        self.indexer.manifest()
    }
}
