//! Vector store abstraction
//!
//! The engine consumes persistent ANN storage through two seams:
//! [`VectorStore`] (one collection: upsert/query/delete/count/list) and
//! [`CollectionCatalog`] (named collections, alias resolution, atomic alias
//! swap). Real deployments inject their own backend; two implementations
//! ship in-tree: [`MemoryCatalog`] for tests and ephemeral use, and
//! [`SqliteCatalog`] for local persistence.
//!
//! Every collection is pinned to exactly one [`EmbedderIdentity`]; any
//! attempt to use a differently-dimensioned embedder against it is an
//! error, not a silently garbled ranking.

mod memory;
mod sqlite;

pub use memory::MemoryCatalog;
pub use sqlite::SqliteCatalog;

use crate::embedding::EmbedderIdentity;
use crate::error::{MindsongError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A full record as written to a collection
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// A nearest-neighbor match: distance is cosine distance (0 = identical)
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub distance: f32,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// A stored entry as returned by [`VectorStore::list`] (no embedding)
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// One logical collection of embedded records
pub trait VectorStore: Send + Sync {
    /// Collection name within its catalog
    fn name(&self) -> &str;

    /// The embedder identity the collection is pinned to, if any
    fn identity(&self) -> Result<Option<EmbedderIdentity>>;

    /// Pin the collection to an embedder identity.
    ///
    /// Pinning an already-pinned collection to a different identity is a
    /// config-class error.
    fn pin_identity(&self, identity: &EmbedderIdentity) -> Result<()>;

    /// Insert or overwrite records by id
    fn upsert(&self, records: &[VectorRecord]) -> Result<()>;

    /// K nearest neighbors by cosine distance, ascending; ties break by
    /// ascending id for determinism
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>>;

    /// Remove records by id; unknown ids are ignored
    fn delete(&self, ids: &[String]) -> Result<()>;

    /// Number of stored records
    fn count(&self) -> Result<u64>;

    /// All stored entries, without embeddings, ordered by id
    fn list(&self) -> Result<Vec<StoredEntry>>;
}

/// Catalog of named collections with alias indirection
///
/// Aliases let a rebuild target a freshly named generation and atomically
/// repoint readers on success, so a rebuild is never observed as an empty
/// store.
pub trait CollectionCatalog: Send + Sync {
    /// Open a collection, creating it (unpinned) if absent
    fn collection(&self, name: &str) -> Result<Arc<dyn VectorStore>>;

    /// Resolve an alias to its current collection name
    fn resolve_alias(&self, alias: &str) -> Result<Option<String>>;

    /// Atomically point an alias at a collection
    fn set_alias(&self, alias: &str, collection: &str) -> Result<()>;

    /// Drop a collection and its records
    fn drop_collection(&self, name: &str) -> Result<()>;

    /// Names of all collections in the catalog
    fn collection_names(&self) -> Result<Vec<String>>;
}

/// Verify a collection against a provider identity, pinning on first use.
///
/// This is the single enforcement point for the one-dimension-per-store
/// invariant; both the indexer and the cache call it before touching a
/// collection.
pub fn ensure_identity(store: &dyn VectorStore, identity: &EmbedderIdentity) -> Result<()> {
    match store.identity()? {
        None => store.pin_identity(identity),
        Some(pinned) if pinned == *identity => Ok(()),
        Some(pinned) => Err(MindsongError::DimensionMismatch {
            collection: store.name().to_string(),
            pinned_model: pinned.model,
            pinned_dim: pinned.dimension,
            actual_model: identity.model.clone(),
            actual_dim: identity.dimension,
        }),
    }
}

/// Cosine distance in [0, 2]; zero vectors are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (mag_a * mag_b)
}

/// Rank candidate hits: ascending distance, then ascending id, truncated
/// to k. Shared by both bundled stores so ordering is identical.
pub(crate) fn rank_hits(mut hits: Vec<QueryHit>, k: usize) -> Vec<QueryHit> {
    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance_basics() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let c = vec![1.0, 0.0];

        assert!((cosine_distance(&a, &c)).abs() < 1e-6);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&a, &[0.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rank_hits_tie_breaks_by_id() {
        let hit = |id: &str, d: f32| QueryHit {
            id: id.to_string(),
            distance: d,
            text: String::new(),
            metadata: BTreeMap::new(),
        };

        let ranked = rank_hits(vec![hit("b", 0.5), hit("a", 0.5), hit("c", 0.1)], 3);
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
