//! Integration tests of the result cache and cached tile counts.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use chrono::{TimeZone, Utc};

use common::*;
use tessera_engine::backends::memory::MemoryCacheStore;
use tessera_engine::cache::{CacheKey, ResultCache, SearchTileCounter, ServedFrom};
use tessera_engine::config::CacheConfig;
use tessera_engine::format::FormattedOutput;
use tessera_engine::tiles::{TileCoord, TileCounter};
use tessera_engine::types::{SearchQuery, TileRequest};

fn lyon_tile() -> TileCoord {
    TileCoord::new(525, 365, 10).unwrap()
}

// ============================================================================
// Keys
// ============================================================================

/// Test that a new finalization makes previous entries unreachable.
#[test]
fn test_key_follows_finalization() {
    let mut dataset = file_dataset("stations", station_schema());
    dataset.finalized_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    let request = TileRequest::new("stations", lyon_tile(), 100);
    let before = CacheKey::tile(&dataset, &request).hash().unwrap();

    dataset.finalized_at = Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap());
    let after = CacheKey::tile(&dataset, &request).hash().unwrap();
    assert_ne!(before, after);
    assert_eq!(after.len(), 64);
}

/// Test that request parameters are part of the key.
#[test]
fn test_key_covers_request() {
    let dataset = file_dataset("stations", station_schema());
    let request = TileRequest::new("stations", lyon_tile(), 100);
    let filtered = request.clone().with_filter("count", "7");
    assert_ne!(
        CacheKey::tile(&dataset, &request).hash().unwrap(),
        CacheKey::tile(&dataset, &filtered).hash().unwrap()
    );
    assert_eq!(
        CacheKey::tile(&dataset, &request).hash().unwrap(),
        CacheKey::tile(&dataset, &request.clone()).hash().unwrap()
    );
}

// ============================================================================
// Cached payloads
// ============================================================================

/// Test that tiles of a refinalized dataset are computed again.
#[tokio::test]
async fn test_refinalized_dataset_misses() {
    let mut dataset = file_dataset("stations", station_schema());
    dataset.finalized_at = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
    let harness = Harness::new(vec![dataset.clone()]);
    harness.search.index_rows("stations", station_rows());
    let formatter = harness.formatter();
    let request = TileRequest::new("stations", lyon_tile(), 100);

    formatter.tile(&dataset, &request).await.unwrap();
    harness.settle_cache(2).await;

    dataset.finalized_at = Some(Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap());
    let FormattedOutput::Tile(tile) = formatter.tile(&dataset, &request).await.unwrap() else {
        panic!("expected a tile");
    };
    assert_eq!(tile.source, ServedFrom::Search);
}

/// Test that a disabled cache computes every time and stores nothing.
#[tokio::test]
async fn test_disabled_cache() {
    let store = Arc::new(MemoryCacheStore::new(10));
    let config = CacheConfig {
        enabled: false,
        ..Default::default()
    };
    let cache = ResultCache::new(store.clone(), &config);
    assert!(!cache.is_enabled());

    let dataset = file_dataset("stations", station_schema());
    let key = CacheKey::tile(&dataset, &TileRequest::new("stations", lyon_tile(), 100));
    for _ in 0..2 {
        let (value, source) = cache
            .get_or_compute(&key, || async { Ok(Bytes::from_static(b"tile")) })
            .await
            .unwrap();
        assert_eq!(value, Bytes::from_static(b"tile"));
        assert_eq!(source, ServedFrom::Search);
    }
    assert!(cache.put_detached(&key, Bytes::from_static(b"tile")).is_none());
    assert!(store.is_empty());
}

/// Test that eviction only touches the named dataset.
#[tokio::test]
async fn test_eviction_is_per_dataset() {
    let store = Arc::new(MemoryCacheStore::new(10));
    let cache = ResultCache::new(store.clone(), &CacheConfig::default());
    let lyon = file_dataset("lyon", station_schema());
    let paris = file_dataset("paris", station_schema());
    let request = TileRequest::new("any", lyon_tile(), 100);

    for dataset in [&lyon, &paris] {
        let key = CacheKey::tile(dataset, &request);
        cache
            .put_detached(&key, Bytes::from_static(b"tile"))
            .unwrap()
            .await
            .unwrap();
    }
    assert_eq!(store.len(), 2);

    cache.evict_dataset("lyon").await;
    assert_eq!(store.len(), 1);
    assert!(cache.get(&CacheKey::tile(&paris, &request)).await.is_some());
    assert!(cache.get(&CacheKey::tile(&lyon, &request)).await.is_none());
}

// ============================================================================
// Tile counts
// ============================================================================

/// Test that tile counts are cached and read back.
#[tokio::test]
async fn test_tile_counts_are_cached() {
    let dataset = file_dataset("stations", station_schema());
    let harness = Harness::new(vec![dataset.clone()]);
    harness.search.index_rows("stations", station_rows());

    let query = SearchQuery::new(100);
    let counter = SearchTileCounter::new(&*harness.search, &dataset, &query)
        .with_cache(&harness.cache);
    assert_eq!(counter.count(lyon_tile()).await.unwrap(), 4);
    harness.settle_cache(1).await;

    // rows indexed after the first count are not seen until eviction
    harness.search.index_rows(
        "stations",
        vec![serde_json::json!({"_id": "6", "_geopoint": "45.76,4.85"})],
    );
    assert_eq!(counter.count(lyon_tile()).await.unwrap(), 4);
    assert_eq!(harness.cache.stats().hits, 1);

    harness.cache.evict_dataset("stations").await;
    assert_eq!(counter.count(lyon_tile()).await.unwrap(), 5);
}

/// Test that filters change the cached count.
#[tokio::test]
async fn test_tile_counts_follow_filters() {
    let dataset = file_dataset("stations", station_schema());
    let harness = Harness::new(vec![dataset.clone()]);
    harness.search.index_rows("stations", station_rows());

    let all = SearchQuery::new(100);
    let filtered = SearchQuery::new(100).with_filter("name", "Vaise");
    let counter = SearchTileCounter::new(&*harness.search, &dataset, &all)
        .with_cache(&harness.cache);
    assert_eq!(counter.count(lyon_tile()).await.unwrap(), 4);
    harness.settle_cache(1).await;

    let counter = SearchTileCounter::new(&*harness.search, &dataset, &filtered)
        .with_cache(&harness.cache);
    assert_eq!(counter.count(lyon_tile()).await.unwrap(), 1);
}
