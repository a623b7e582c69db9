//! Capability handler table
//!
//! Integrations (chat pipelines, tool routers) invoke the engine by
//! operation name. Rather than resolving `"module.function"` strings
//! reflectively per call, every operation implements one [`Operation`]
//! trait and is registered in an [`OpRegistry`] at startup; unknown names
//! are a typed error. Arguments and results are JSON values so the table
//! composes with any transport.

use crate::config::IndexingConfig;
use crate::engine::GroundingEngine;
use crate::error::{MindsongError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

/// One named capability over the engine
#[async_trait]
pub trait Operation: Send + Sync {
    fn name(&self) -> &'static str;
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Handler table resolved at startup
pub struct OpRegistry {
    handlers: HashMap<&'static str, Arc<dyn Operation>>,
}

impl OpRegistry {
    /// Registry with the engine's standard operations.
    pub fn with_engine(engine: Arc<GroundingEngine>) -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
        };
        registry.register(Arc::new(SearchOp {
            engine: engine.clone(),
        }));
        registry.register(Arc::new(CacheGetOp {
            engine: engine.clone(),
        }));
        registry.register(Arc::new(CacheSetOp {
            engine: engine.clone(),
        }));
        registry.register(Arc::new(CacheSweepOp {
            engine: engine.clone(),
        }));
        registry.register(Arc::new(IndexOp {
            engine: engine.clone(),
            rebuild: false,
        }));
        registry.register(Arc::new(IndexOp {
            engine: engine.clone(),
            rebuild: true,
        }));
        registry.register(Arc::new(ManifestOp { engine }));
        registry
    }

    pub fn register(&mut self, op: Arc<dyn Operation>) {
        self.handlers.insert(op.name(), op);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Operation>> {
        self.handlers.get(name).cloned()
    }

    /// Registered operation names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Execute a named operation; unknown names are a typed error.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<Value> {
        match self.resolve(name) {
            Some(op) => op.execute(args).await,
            None => Err(MindsongError::UnknownOperation(name.to_string())),
        }
    }
}

fn parse_args<T: DeserializeOwned>(op: &str, args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| MindsongError::Json {
        source: e,
        context: format!("Invalid arguments for operation '{}'", op),
    })
}

fn to_value<T: Serialize>(op: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| MindsongError::Json {
        source: e,
        context: format!("Failed to serialize result of operation '{}'", op),
    })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default = "default_n_results")]
    n_results: usize,
    #[serde(default)]
    file_filter: Option<String>,
}

fn default_n_results() -> usize {
    5
}

struct SearchOp {
    engine: Arc<GroundingEngine>,
}

#[async_trait]
impl Operation for SearchOp {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let args: SearchArgs = parse_args(self.name(), args)?;
        let response = self
            .engine
            .search(&args.query, args.n_results, args.file_filter.as_deref())
            .await?;
        to_value(self.name(), &response)
    }
}

#[derive(Debug, Deserialize)]
struct CacheGetArgs {
    query: String,
    #[serde(default)]
    context: BTreeMap<String, String>,
}

struct CacheGetOp {
    engine: Arc<GroundingEngine>,
}

#[async_trait]
impl Operation for CacheGetOp {
    fn name(&self) -> &'static str {
        "cache.get"
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let args: CacheGetArgs = parse_args(self.name(), args)?;
        let lookup = self.engine.cache_get(&args.query, &args.context).await?;
        to_value(self.name(), &lookup)
    }
}

#[derive(Debug, Deserialize)]
struct CacheSetArgs {
    query: String,
    response: String,
    #[serde(default)]
    context: BTreeMap<String, String>,
}

struct CacheSetOp {
    engine: Arc<GroundingEngine>,
}

#[async_trait]
impl Operation for CacheSetOp {
    fn name(&self) -> &'static str {
        "cache.set"
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let args: CacheSetArgs = parse_args(self.name(), args)?;
        let id = self
            .engine
            .cache_set(&args.query, &args.response, &args.context)
            .await?;
        Ok(serde_json::json!({ "id": id }))
    }
}

struct CacheSweepOp {
    engine: Arc<GroundingEngine>,
}

#[async_trait]
impl Operation for CacheSweepOp {
    fn name(&self) -> &'static str {
        "cache.sweep"
    }

    async fn execute(&self, _args: Value) -> Result<Value> {
        let removed = self.engine.clear_expired_cache()?;
        Ok(serde_json::json!({ "removed": removed }))
    }
}

#[derive(Debug, Deserialize)]
struct IndexArgs {
    root: PathBuf,
    #[serde(default)]
    allow_exts: Option<BTreeSet<String>>,
    #[serde(default)]
    skip_dirs: Option<BTreeSet<String>>,
    #[serde(default)]
    max_file_size: Option<u64>,
}

struct IndexOp {
    engine: Arc<GroundingEngine>,
    rebuild: bool,
}

#[async_trait]
impl Operation for IndexOp {
    fn name(&self) -> &'static str {
        if self.rebuild {
            "rebuild"
        } else {
            "index"
        }
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let args: IndexArgs = parse_args(self.name(), args)?;

        let defaults = self.engine.indexing_defaults();
        let opts = IndexingConfig {
            allow_exts: args.allow_exts.unwrap_or_else(|| defaults.allow_exts.clone()),
            skip_dirs: args.skip_dirs.unwrap_or_else(|| defaults.skip_dirs.clone()),
            max_file_size: args.max_file_size.unwrap_or(defaults.max_file_size),
        };

        let report = if self.rebuild {
            self.engine.rebuild_with(&args.root, &opts).await?
        } else {
            self.engine.index_with(&args.root, &opts).await?
        };
        to_value(self.name(), &report)
    }
}

struct ManifestOp {
    engine: Arc<GroundingEngine>,
}

#[async_trait]
impl Operation for ManifestOp {
    fn name(&self) -> &'static str {
        "manifest"
    }

    async fn execute(&self, _args: Value) -> Result<Value> {
        let manifest = self.engine.manifest()?;
        to_value(self.name(), &manifest)
    }
}
