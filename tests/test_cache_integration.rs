//! Semantic cache behavior: similarity and TTL boundaries, overwrite
//! semantics, expiry sweeps, and degraded backends.

mod common;

use chrono::{Duration, Utc};
use common::{test_config, DownProvider, StaticProvider, TokenHashProvider};
use mindsong::cache::SemanticCache;
use mindsong::embedding::BatchEmbedder;
use mindsong::error::MindsongError;
use mindsong::store::{cosine_distance, CollectionCatalog, MemoryCatalog, VectorRecord, VectorStore};
use mindsong::GroundingEngine;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

const CACHE: &str = "roxy_cache";

fn static_embedder(entries: &[(&str, Vec<f32>)]) -> BatchEmbedder {
    common::init_tracing();
    let data = TempDir::new().unwrap();
    BatchEmbedder::new(
        Arc::new(StaticProvider::new(2, entries)),
        &test_config(data.path()).embedding,
    )
}

fn cache_over(
    embedder: &BatchEmbedder,
    catalog: &Arc<MemoryCatalog>,
    ttl_hours: u64,
    threshold: f32,
) -> SemanticCache {
    SemanticCache::new(
        embedder.clone(),
        catalog.clone(),
        CACHE,
        ttl_hours,
        threshold,
    )
    .unwrap()
}

#[tokio::test]
async fn test_similarity_boundary_hit_at_threshold_miss_below() {
    let anchor = vec![1.0f32, 0.0];
    let probe = vec![0.85f32, 0.526_782_6];

    // The probe sits at ~0.85 similarity to the anchor.
    let similarity = 1.0 - cosine_distance(&probe, &anchor);
    assert!((similarity - 0.85).abs() < 1e-3);

    let embedder = static_embedder(&[("anchor", anchor), ("probe", probe)]);
    let catalog = Arc::new(MemoryCatalog::new());
    let ctx = BTreeMap::new();

    // A candidate exactly at the threshold is a hit.
    let at_threshold = cache_over(&embedder, &catalog, 24, similarity);
    at_threshold.set("anchor", "the cached answer", &ctx).await.unwrap();

    let lookup = at_threshold.get("probe", &ctx).await.unwrap();
    assert!(lookup.hit);
    assert_eq!(lookup.response.as_deref(), Some("the cached answer"));
    let reported = lookup.similarity.unwrap();
    assert!((reported - similarity).abs() < 1e-6);

    // The same candidate sitting just below the threshold is a miss.
    let above = cache_over(&embedder, &catalog, 24, similarity + 1e-4);
    let lookup = above.get("probe", &ctx).await.unwrap();
    assert!(!lookup.hit);
    assert!(lookup.response.is_none());
    assert!((lookup.similarity.unwrap() - similarity).abs() < 1e-6);
}

#[tokio::test]
async fn test_ttl_boundary_independent_of_similarity() {
    let embedder = static_embedder(&[("anchor", vec![1.0, 0.0])]);
    let catalog = Arc::new(MemoryCatalog::new());
    let cache = cache_over(&embedder, &catalog, 24, 0.85);
    let ctx = BTreeMap::new();

    let store = catalog.collection(CACHE).unwrap();
    let entry = |id: &str, age: Duration| {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "created_at".to_string(),
            (Utc::now() - age).to_rfc3339(),
        );
        VectorRecord {
            id: id.to_string(),
            embedding: vec![1.0, 0.0],
            text: "cached response".to_string(),
            metadata,
        }
    };

    // Written just inside the TTL window: a hit at perfect similarity.
    store
        .upsert(&[entry("young", Duration::hours(24) - Duration::seconds(30))])
        .unwrap();
    let lookup = cache.get("anchor", &ctx).await.unwrap();
    assert!(lookup.hit);
    assert!(lookup.similarity.unwrap() > 0.999);

    // Past the TTL: a miss even at perfect similarity, and the expired
    // entry is opportunistically removed.
    store.delete(&["young".to_string()]).unwrap();
    store
        .upsert(&[entry("old", Duration::hours(24) + Duration::seconds(30))])
        .unwrap();

    let lookup = cache.get("anchor", &ctx).await.unwrap();
    assert!(!lookup.hit);
    assert!(lookup.similarity.unwrap() > 0.999);
    assert_eq!(store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_set_overwrites_same_normalized_query() {
    let embedder = static_embedder(&[("anchor", vec![1.0, 0.0])]);
    let catalog = Arc::new(MemoryCatalog::new());
    let cache = cache_over(&embedder, &catalog, 24, 0.85);
    let ctx = BTreeMap::new();

    let first = cache.set("Anchor", "first answer", &ctx).await.unwrap();
    let second = cache.set("  anchor  ", "second answer", &ctx).await.unwrap();
    assert_eq!(first, second);

    let store = catalog.collection(CACHE).unwrap();
    assert_eq!(store.count().unwrap(), 1);

    let lookup = cache.get("anchor", &ctx).await.unwrap();
    assert!(lookup.hit);
    assert_eq!(lookup.response.as_deref(), Some("second answer"));
}

#[tokio::test]
async fn test_clear_expired_sweeps_only_stale_entries() {
    let embedder = static_embedder(&[("anchor", vec![1.0, 0.0])]);
    let catalog = Arc::new(MemoryCatalog::new());
    let cache = cache_over(&embedder, &catalog, 24, 0.85);

    let store = catalog.collection(CACHE).unwrap();
    let entry = |id: &str, age_hours: i64, vector: Vec<f32>| {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "created_at".to_string(),
            (Utc::now() - Duration::hours(age_hours)).to_rfc3339(),
        );
        VectorRecord {
            id: id.to_string(),
            embedding: vector,
            text: "response".to_string(),
            metadata,
        }
    };

    store
        .upsert(&[
            entry("fresh", 1, vec![1.0, 0.0]),
            entry("stale", 48, vec![0.0, 1.0]),
            entry("ancient", 400, vec![0.5, 0.5]),
        ])
        .unwrap();

    let removed = cache.clear_expired().unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.list().unwrap()[0].id, "fresh");
}

#[tokio::test]
async fn test_engine_cache_round_trip_and_miss() {
    let data = TempDir::new().unwrap();
    let engine = GroundingEngine::new(
        test_config(data.path()),
        Arc::new(TokenHashProvider::new(64)),
        Arc::new(MemoryCatalog::new()),
    )
    .unwrap();
    let ctx = BTreeMap::new();

    engine
        .cache_set(
            "what is the deployment plan",
            "Deploys go out Tuesdays.",
            &ctx,
        )
        .await
        .unwrap();

    // Identical query (modulo case/whitespace): a hit at similarity 1.
    let lookup = engine
        .cache_get("What is the   deployment plan", &ctx)
        .await
        .unwrap();
    assert!(lookup.hit);
    assert_eq!(lookup.response.as_deref(), Some("Deploys go out Tuesdays."));
    assert!(lookup.similarity.unwrap() > 0.999);

    // An unrelated query falls below the similarity threshold.
    let lookup = engine
        .cache_get("favorite walrus trivia category", &ctx)
        .await
        .unwrap();
    assert!(!lookup.hit);
    assert!(lookup.response.is_none());
}

#[tokio::test]
async fn test_context_scopes_cache_entries() {
    let data = TempDir::new().unwrap();
    let engine = GroundingEngine::new(
        test_config(data.path()),
        Arc::new(TokenHashProvider::new(64)),
        Arc::new(MemoryCatalog::new()),
    )
    .unwrap();

    let mut ctx_a = BTreeMap::new();
    ctx_a.insert("persona".to_string(), "formal".to_string());
    let mut ctx_b = BTreeMap::new();
    ctx_b.insert("persona".to_string(), "casual".to_string());

    engine
        .cache_set("greeting", "Good evening.", &ctx_a)
        .await
        .unwrap();
    engine.cache_set("greeting", "hey!", &ctx_b).await.unwrap();

    let lookup = engine.cache_get("greeting", &ctx_a).await.unwrap();
    assert!(lookup.hit);
    assert_eq!(lookup.response.as_deref(), Some("Good evening."));

    let lookup = engine.cache_get("greeting", &ctx_b).await.unwrap();
    assert!(lookup.hit);
    assert_eq!(lookup.response.as_deref(), Some("hey!"));
}

#[tokio::test]
async fn test_down_backend_degrades_get_and_fails_set() {
    let data = TempDir::new().unwrap();
    let mut config = test_config(data.path());
    config.embedding.max_retries = 1;

    let engine = GroundingEngine::new(
        config,
        Arc::new(DownProvider::new("token-hash", 16)),
        Arc::new(MemoryCatalog::new()),
    )
    .unwrap();
    let ctx = BTreeMap::new();

    // Reads degrade to a miss so the caller can fall through.
    let lookup = engine.cache_get("anything", &ctx).await.unwrap();
    assert!(!lookup.hit);

    // Writes surface the failure as a typed error.
    let result = engine.cache_set("anything", "response", &ctx).await;
    assert!(matches!(result, Err(MindsongError::BackendUnavailable(_))));
}
