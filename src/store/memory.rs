//! In-memory catalog: exact-scan cosine search over hash maps
//!
//! Used by tests and ephemeral deployments; the behavior (identity
//! pinning, alias swap, ranking) matches the sqlite catalog exactly.

use super::{
    cosine_distance, rank_hits, CollectionCatalog, QueryHit, StoredEntry, VectorRecord, VectorStore,
};
use crate::embedding::EmbedderIdentity;
use crate::error::{MindsongError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct CatalogState {
    collections: HashMap<String, Arc<MemoryCollection>>,
    aliases: HashMap<String, String>,
}

/// Catalog of in-memory collections
#[derive(Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionCatalog for MemoryCatalog {
    fn collection(&self, name: &str) -> Result<Arc<dyn VectorStore>> {
        let mut state = self.state.write().unwrap();
        let collection = state
            .collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone();
        Ok(collection)
    }

    fn resolve_alias(&self, alias: &str) -> Result<Option<String>> {
        let state = self.state.read().unwrap();
        Ok(state.aliases.get(alias).cloned())
    }

    fn set_alias(&self, alias: &str, collection: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if !state.collections.contains_key(collection) {
            return Err(MindsongError::Config(format!(
                "Cannot alias '{}' to unknown collection '{}'",
                alias, collection
            )));
        }
        state
            .aliases
            .insert(alias.to_string(), collection.to_string());
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.collections.remove(name);
        state.aliases.retain(|_, target| target != name);
        Ok(())
    }

    fn collection_names(&self) -> Result<Vec<String>> {
        let state = self.state.read().unwrap();
        let mut names: Vec<String> = state.collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

struct CollectionState {
    identity: Option<EmbedderIdentity>,
    records: BTreeMap<String, VectorRecord>,
}

/// One in-memory collection
pub struct MemoryCollection {
    name: String,
    state: RwLock<CollectionState>,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(CollectionState {
                identity: None,
                records: BTreeMap::new(),
            }),
        }
    }

    fn pinned_dimension(&self, state: &CollectionState) -> Result<usize> {
        state
            .identity
            .as_ref()
            .map(|i| i.dimension)
            .ok_or_else(|| {
                MindsongError::Config(format!(
                    "Collection '{}' has no pinned embedder identity",
                    self.name
                ))
            })
    }
}

impl VectorStore for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> Result<Option<EmbedderIdentity>> {
        Ok(self.state.read().unwrap().identity.clone())
    }

    fn pin_identity(&self, identity: &EmbedderIdentity) -> Result<()> {
        let mut state = self.state.write().unwrap();
        match &state.identity {
            None => {
                state.identity = Some(identity.clone());
                Ok(())
            }
            Some(pinned) if pinned == identity => Ok(()),
            Some(pinned) => Err(MindsongError::DimensionMismatch {
                collection: self.name.clone(),
                pinned_model: pinned.model.clone(),
                pinned_dim: pinned.dimension,
                actual_model: identity.model.clone(),
                actual_dim: identity.dimension,
            }),
        }
    }

    fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        let dimension = self.pinned_dimension(&state)?;

        for record in records {
            if record.embedding.len() != dimension {
                return Err(MindsongError::Config(format!(
                    "Vector length {} does not match pinned dimension {} for collection '{}'",
                    record.embedding.len(),
                    dimension,
                    self.name
                )));
            }
        }

        for record in records {
            state.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>> {
        let state = self.state.read().unwrap();
        let dimension = self.pinned_dimension(&state)?;

        if embedding.len() != dimension {
            return Err(MindsongError::Config(format!(
                "Query vector length {} does not match pinned dimension {} for collection '{}'",
                embedding.len(),
                dimension,
                self.name
            )));
        }

        let hits = state
            .records
            .values()
            .map(|record| QueryHit {
                id: record.id.clone(),
                distance: cosine_distance(embedding, &record.embedding),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect();

        Ok(rank_hits(hits, k))
    }

    fn delete(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        for id in ids {
            state.records.remove(id);
        }
        Ok(())
    }

    fn count(&self) -> Result<u64> {
        Ok(self.state.read().unwrap().records.len() as u64)
    }

    fn list(&self) -> Result<Vec<StoredEntry>> {
        let state = self.state.read().unwrap();
        Ok(state
            .records
            .values()
            .map(|record| StoredEntry {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect())
    }
}
