//! Indexer: walks a corpus tree into chunked, embedded, upserted records
//!
//! Ids are content-addressed (source path + content hash + chunk index),
//! which makes indexing idempotent and safely resumable: re-running over
//! an unchanged tree rewrites the same ids, and an interrupted run
//! converges on the next attempt. Full rebuilds target a freshly named
//! generation collection and atomically repoint the alias on success, so
//! readers never observe an empty store.

mod git;
mod lock;
mod manifest;
mod walker;

pub use git::{git_provenance, GitProvenance};
pub use lock::IndexLock;
pub use manifest::{IndexManifest, IndexStats};
pub use walker::{walk_tree, FilesystemSurvey, WalkOutcome, WalkedFile};

use crate::chunker::Chunker;
use crate::config::{Config, IndexingConfig};
use crate::embedding::BatchEmbedder;
use crate::error::Result;
use crate::store::{ensure_identity, CollectionCatalog, VectorRecord, VectorStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// File name of the manifest within the data directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// A single file that failed during an otherwise-successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndexError {
    pub path: String,
    pub reason: String,
}

/// Outcome of one index run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub indexed_files: usize,
    pub skipped_files: usize,
    pub total_chunks: usize,
    pub errors: Vec<FileIndexError>,
}

/// Deterministic chunk id from source path, file content hash, and window
/// index. Unchanged content re-derives the same id, so upserts are no-ops.
pub fn chunk_id(source_path: &str, content_hash: &str, chunk_index: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(source_path.as_bytes());
    hasher.update(&[0]);
    hasher.update(content_hash.as_bytes());
    hasher.update(&[0]);
    hasher.update(&chunk_index.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

/// blake3 of a file body, hex encoded
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

struct RunOutput {
    report: IndexReport,
    survey: FilesystemSurvey,
}

/// Walks a document tree and maintains the document collection
pub struct Indexer {
    embedder: BatchEmbedder,
    catalog: Arc<dyn CollectionCatalog>,
    alias: String,
    chunker: Chunker,
    data_dir: PathBuf,
}

impl Indexer {
    pub fn new(
        embedder: BatchEmbedder,
        catalog: Arc<dyn CollectionCatalog>,
        config: &Config,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.overlap)?;
        Ok(Self {
            embedder,
            catalog,
            alias: config.storage.docs_alias.clone(),
            chunker,
            data_dir: config.storage.data_dir.clone(),
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join(MANIFEST_FILE)
    }

    /// Read the manifest written by the most recent completed run.
    pub fn manifest(&self) -> Result<IndexManifest> {
        IndexManifest::read_from(&self.manifest_path())
    }

    /// Incremental index into the alias's current generation (created on
    /// first use). Holds the writer lock for the duration of the run.
    pub async fn index(&self, root: &Path, opts: &IndexingConfig) -> Result<IndexReport> {
        let _lock = IndexLock::try_acquire(&self.data_dir)?;

        let target = match self.catalog.resolve_alias(&self.alias)? {
            Some(name) => name,
            None => {
                let name = self.next_generation()?;
                self.catalog.collection(&name)?;
                self.catalog.set_alias(&self.alias, &name)?;
                name
            }
        };
        let store = self.catalog.collection(&target)?;
        ensure_identity(store.as_ref(), &self.embedder.identity())?;

        info!("Indexing {:?} into collection '{}'", root, target);
        let output = self.run(root, opts, store.as_ref()).await?;
        self.write_manifest(root, opts, store.as_ref(), output.survey)?;

        Ok(output.report)
    }

    /// Full rebuild: build into a fresh generation, swap the alias only on
    /// success, then drop the previous generation. A failed build is
    /// discarded and never becomes visible to readers.
    pub async fn rebuild(&self, root: &Path, opts: &IndexingConfig) -> Result<IndexReport> {
        let _lock = IndexLock::try_acquire(&self.data_dir)?;

        let previous = self.catalog.resolve_alias(&self.alias)?;
        let target = self.next_generation()?;
        let store = self.catalog.collection(&target)?;
        ensure_identity(store.as_ref(), &self.embedder.identity())?;

        info!(
            "Rebuilding {:?} into fresh collection '{}' (alias '{}')",
            root, target, self.alias
        );

        match self.run(root, opts, store.as_ref()).await {
            Ok(output) => {
                self.catalog.set_alias(&self.alias, &target)?;
                if let Some(old) = previous {
                    if old != target {
                        self.catalog.drop_collection(&old)?;
                    }
                }
                self.write_manifest(root, opts, store.as_ref(), output.survey)?;
                Ok(output.report)
            }
            Err(e) => {
                warn!("Rebuild failed, discarding collection '{}': {}", target, e);
                let _ = self.catalog.drop_collection(&target);
                Err(e)
            }
        }
    }

    fn next_generation(&self) -> Result<String> {
        let prefix = format!("{}__g", self.alias);
        let mut max = 0u32;
        for name in self.catalog.collection_names()? {
            if let Some(rest) = name.strip_prefix(&prefix) {
                if let Ok(n) = rest.parse::<u32>() {
                    max = max.max(n);
                }
            }
        }
        Ok(format!("{}{:03}", prefix, max + 1))
    }

    async fn run(
        &self,
        root: &Path,
        opts: &IndexingConfig,
        store: &dyn VectorStore,
    ) -> Result<RunOutput> {
        let outcome = walk_tree(root, opts)?;

        // One pass over the stored entries so changed files can be pruned
        // of ids their previous content produced.
        let mut existing: HashMap<String, Vec<String>> = HashMap::new();
        for entry in store.list()? {
            if let Some(source) = entry.metadata.get("source_path") {
                existing.entry(source.clone()).or_default().push(entry.id);
            }
        }

        let mut report = IndexReport {
            skipped_files: outcome.skipped_files,
            ..Default::default()
        };

        for file in &outcome.files {
            let text = match std::fs::read_to_string(&file.path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to read {:?}: {}", file.path, e);
                    report.errors.push(FileIndexError {
                        path: file.rel_path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let windows = self.chunker.split(&text);
            if windows.is_empty() {
                // Whitespace-only; also drop whatever an earlier version of
                // this file contributed.
                if let Some(old) = existing.remove(&file.rel_path) {
                    store.delete(&old)?;
                }
                report.skipped_files += 1;
                continue;
            }

            let hash = content_hash(&text);
            let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
            let embeddings = match self.embedder.embed_texts(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) if e.is_transient() => {
                    // The backend stayed down through every retry; nothing
                    // file-specific about that. Abort; a later run resumes.
                    return Err(e.into());
                }
                Err(e) => {
                    report.errors.push(FileIndexError {
                        path: file.rel_path.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if embeddings.len() != windows.len() {
                report.errors.push(FileIndexError {
                    path: file.rel_path.clone(),
                    reason: format!(
                        "embedding count mismatch: expected {}, got {}",
                        windows.len(),
                        embeddings.len()
                    ),
                });
                continue;
            }

            let total = windows.len();
            let records: Vec<VectorRecord> = windows
                .iter()
                .zip(embeddings)
                .map(|(window, embedding)| {
                    let mut metadata = BTreeMap::new();
                    metadata.insert("source_path".to_string(), file.rel_path.clone());
                    metadata.insert("chunk_index".to_string(), window.index.to_string());
                    metadata.insert("total_chunks".to_string(), total.to_string());
                    metadata.insert("content_hash".to_string(), hash.clone());
                    VectorRecord {
                        id: chunk_id(&file.rel_path, &hash, window.index),
                        embedding,
                        text: window.text.clone(),
                        metadata,
                    }
                })
                .collect();

            store.upsert(&records)?;

            if let Some(old) = existing.remove(&file.rel_path) {
                let fresh: HashSet<&String> = records.iter().map(|r| &r.id).collect();
                let stale: Vec<String> = old.into_iter().filter(|id| !fresh.contains(id)).collect();
                if !stale.is_empty() {
                    store.delete(&stale)?;
                }
            }

            report.indexed_files += 1;
            report.total_chunks += total;
        }

        info!(
            "Index run complete: {} files indexed, {} skipped, {} chunks, {} errors",
            report.indexed_files,
            report.skipped_files,
            report.total_chunks,
            report.errors.len()
        );

        Ok(RunOutput {
            report,
            survey: outcome.survey,
        })
    }

    fn write_manifest(
        &self,
        root: &Path,
        opts: &IndexingConfig,
        store: &dyn VectorStore,
        survey: FilesystemSurvey,
    ) -> Result<IndexManifest> {
        let entries = store.list()?;
        let unique_files: HashSet<&String> = entries
            .iter()
            .filter_map(|e| e.metadata.get("source_path"))
            .collect();

        let manifest = IndexManifest {
            repo_path: root.display().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            git: git_provenance(root),
            index_stats: IndexStats {
                total_chunks: store.count()?,
                unique_files: unique_files.len() as u64,
            },
            skip_dirs: opts.skip_dirs.iter().cloned().collect(),
            allow_exts: opts.allow_exts.iter().cloned().collect(),
            max_file_size: opts.max_file_size,
            filesystem: survey,
            manifest_sha256: String::new(),
        }
        .seal()?;

        manifest.write_to(&self.manifest_path())?;
        Ok(manifest)
    }
}
