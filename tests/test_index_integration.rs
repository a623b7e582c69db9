//! End-to-end indexing: the three-file scenario, idempotence,
//! resumability, filtering, partial failures, manifests, and rebuilds.

mod common;

use common::{test_config, write_file, write_scenario_corpus, TokenHashProvider};
use mindsong::error::MindsongError;
use mindsong::index::IndexLock;
use mindsong::store::{CollectionCatalog, MemoryCatalog, SqliteCatalog};
use mindsong::GroundingEngine;
use std::sync::Arc;
use tempfile::TempDir;

fn engine_over(catalog: Arc<dyn CollectionCatalog>, data_dir: &std::path::Path) -> GroundingEngine {
    common::init_tracing();
    GroundingEngine::new(
        test_config(data_dir),
        Arc::new(TokenHashProvider::new(16)),
        catalog,
    )
    .unwrap()
}

#[tokio::test]
async fn test_scenario_corpus_chunk_counts() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());
    let report = engine.index(corpus.path()).await.unwrap();

    assert_eq!(report.indexed_files, 3);
    assert_eq!(report.skipped_files, 0);
    assert_eq!(report.total_chunks, 9);
    assert!(report.errors.is_empty());

    let manifest = engine.manifest().unwrap();
    assert_eq!(manifest.index_stats.total_chunks, 9);
    assert_eq!(manifest.index_stats.unique_files, 3);
}

#[tokio::test]
async fn test_indexing_is_idempotent() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());

    let first = engine.index(corpus.path()).await.unwrap();
    let second = engine.index(corpus.path()).await.unwrap();

    assert_eq!(first.total_chunks, second.total_chunks);

    // Stored count is unchanged: same ids were upserted, not appended.
    let manifest = engine.manifest().unwrap();
    assert_eq!(manifest.index_stats.total_chunks, 9);
    assert_eq!(manifest.index_stats.unique_files, 3);
}

#[tokio::test]
async fn test_interrupted_run_converges_on_rerun() {
    let data_full = TempDir::new().unwrap();
    let data_resumed = TempDir::new().unwrap();

    // Reference: one uninterrupted run over the whole corpus.
    let corpus = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());
    let uninterrupted = engine_over(Arc::new(MemoryCatalog::new()), data_full.path());
    uninterrupted.index(corpus.path()).await.unwrap();
    let expected = uninterrupted.manifest().unwrap();

    // "Interrupted" run: only part of the corpus existed the first time;
    // the rerun sees the full tree and converges on the same state.
    let partial = TempDir::new().unwrap();
    write_file(
        partial.path(),
        "A.md",
        &common::filler_text("onboarding", 1500),
    );
    let engine = engine_over(Arc::new(MemoryCatalog::new()), data_resumed.path());
    engine.index(partial.path()).await.unwrap();

    write_scenario_corpus(partial.path());
    engine.index(partial.path()).await.unwrap();

    let resumed = engine.manifest().unwrap();
    assert_eq!(
        resumed.index_stats.total_chunks,
        expected.index_stats.total_chunks
    );
    assert_eq!(
        resumed.index_stats.unique_files,
        expected.index_stats.unique_files
    );
}

#[tokio::test]
async fn test_filters_skip_but_count() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_file(corpus.path(), "keep.md", "kept content for the index");
    write_file(corpus.path(), "binary.dat", "wrong extension");
    write_file(corpus.path(), "big.md", &common::filler_text("big", 2_000_000));
    write_file(corpus.path(), "node_modules/dep.md", "pruned before descent");

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());
    let report = engine.index(corpus.path()).await.unwrap();

    assert_eq!(report.indexed_files, 1);
    // One wrong extension, one oversized; the pruned dir was never seen.
    assert_eq!(report.skipped_files, 2);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_whitespace_only_file_is_skipped() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_file(corpus.path(), "empty.md", "  \n\n \t ");
    write_file(corpus.path(), "real.md", "actual content");

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());
    let report = engine.index(corpus.path()).await.unwrap();

    assert_eq!(report.indexed_files, 1);
    assert_eq!(report.skipped_files, 1);
}

#[tokio::test]
async fn test_unreadable_file_is_counted_not_fatal() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_file(corpus.path(), "good.md", "readable content");
    // Invalid UTF-8 under an allowed extension
    std::fs::write(corpus.path().join("bad.md"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());
    let report = engine.index(corpus.path()).await.unwrap();

    assert_eq!(report.indexed_files, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, "bad.md");
}

#[tokio::test]
async fn test_missing_root_is_fatal() {
    let data = TempDir::new().unwrap();
    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());

    let result = engine
        .index(std::path::Path::new("/nonexistent/corpus/root"))
        .await;
    assert!(matches!(result, Err(MindsongError::FatalIndex(_))));
}

#[tokio::test]
async fn test_manifest_is_written_and_verifies() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());
    engine.index(corpus.path()).await.unwrap();

    let manifest = engine.manifest().unwrap();
    assert!(manifest.verify().unwrap());
    // Temp dirs are not git repositories; that is not an error.
    assert!(manifest.git.is_none());
    assert!(manifest.allow_exts.contains(&"md".to_string()));
    assert_eq!(manifest.filesystem.total_files, 3);
    assert!(manifest.filesystem.total_bytes >= 6800);

    // Drift detection: a tampered manifest no longer verifies.
    let mut tampered = manifest.clone();
    tampered.repo_path = "/somewhere/else".to_string();
    assert!(!tampered.verify().unwrap());
}

#[tokio::test]
async fn test_changed_file_does_not_accumulate_stale_chunks() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_file(corpus.path(), "doc.md", &common::filler_text("first", 1500));

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());
    engine.index(corpus.path()).await.unwrap();
    assert_eq!(engine.manifest().unwrap().index_stats.total_chunks, 2);

    // New content, new content hash, new ids; the old ids must go.
    write_file(corpus.path(), "doc.md", &common::filler_text("second", 300));
    engine.index(corpus.path()).await.unwrap();

    let manifest = engine.manifest().unwrap();
    assert_eq!(manifest.index_stats.total_chunks, 1);
    assert_eq!(manifest.index_stats.unique_files, 1);
}

#[tokio::test]
async fn test_rebuild_swaps_alias_and_drops_old_generation() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());

    let catalog = Arc::new(MemoryCatalog::new());
    let engine = engine_over(catalog.clone(), data.path());

    engine.index(corpus.path()).await.unwrap();
    assert_eq!(
        catalog.resolve_alias("mindsong_docs").unwrap().as_deref(),
        Some("mindsong_docs__g001")
    );

    engine.rebuild(corpus.path()).await.unwrap();
    assert_eq!(
        catalog.resolve_alias("mindsong_docs").unwrap().as_deref(),
        Some("mindsong_docs__g002")
    );

    // The old generation is gone; only the new one (and the cache
    // collection) remain.
    let names = catalog.collection_names().unwrap();
    assert!(names.contains(&"mindsong_docs__g002".to_string()));
    assert!(!names.contains(&"mindsong_docs__g001".to_string()));

    // Search still works against the swapped-in generation.
    let response = engine.search("onboarding", 3, None).await.unwrap();
    assert!(!response.is_degraded());
    assert!(!response.results.is_empty());
}

#[tokio::test]
async fn test_concurrent_index_rejected_by_lock() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());

    let engine = engine_over(Arc::new(MemoryCatalog::new()), data.path());

    let held = IndexLock::try_acquire(data.path()).unwrap();
    let result = engine.index(corpus.path()).await;
    assert!(matches!(result, Err(MindsongError::IndexLocked { .. })));

    drop(held);
    assert!(engine.index(corpus.path()).await.is_ok());
}

#[tokio::test]
async fn test_sqlite_backed_index_survives_engine_restart() {
    let corpus = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write_scenario_corpus(corpus.path());

    let db_path = data.path().join("store.sqlite");
    {
        let catalog = Arc::new(SqliteCatalog::new(&db_path).unwrap());
        let engine = engine_over(catalog, data.path());
        let report = engine.index(corpus.path()).await.unwrap();
        assert_eq!(report.total_chunks, 9);
    }

    // A fresh engine over the same database sees the same index.
    let catalog = Arc::new(SqliteCatalog::new(&db_path).unwrap());
    let engine = engine_over(catalog, data.path());
    let response = engine.search("onboarding", 3, None).await.unwrap();
    assert!(!response.is_degraded());
    assert!(!response.results.is_empty());

    let manifest = engine.manifest().unwrap();
    assert_eq!(manifest.index_stats.total_chunks, 9);
}
