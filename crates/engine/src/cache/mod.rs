//! Content-addressed result cache.
//!
//! Tiles and tile counts are expensive to compute and read far more often
//! than their dataset changes. A [`CacheKey`] names everything a payload
//! depends on, including the dataset's `finalizedAt` marker, so a new
//! finalization makes every old entry unreachable.
//!
//! The cache is strictly best effort: a failed lookup is a miss, a failed
//! write is logged and counted, and neither ever fails the request.

mod counter;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::core::{CacheEntry, CacheStore, InsertOutcome};
use crate::error::EngineResult;
use crate::types::{Dataset, SamplingMode, TileRequest};

pub use counter::SearchTileCounter;

/// Kind of a cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// An encoded vector tile.
    Tile,
    /// The row count of a tile.
    TileCount,
    /// A geo aggregation over a tile.
    TileGeoAgg,
    /// A values aggregation over a tile.
    TileValuesAgg,
}

/// Everything a cached payload depends on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheKey {
    pub kind: CacheKind,
    pub dataset_id: String,
    /// `finalizedAt` of the dataset when the payload was computed.
    pub version_marker: Option<DateTime<Utc>>,
    pub sampling: SamplingMode,
    /// Request parameters.
    pub query: Value,
}

impl CacheKey {
    pub fn new(kind: CacheKind, dataset: &Dataset, sampling: SamplingMode, query: Value) -> Self {
        Self {
            kind,
            dataset_id: dataset.id.clone(),
            version_marker: dataset.finalized_at,
            sampling,
            query,
        }
    }

    /// Returns the key of an encoded tile.
    pub fn tile(dataset: &Dataset, request: &TileRequest) -> Self {
        Self::new(CacheKind::Tile, dataset, request.sampling, request.cache_query())
    }

    /// Returns the SHA-256 of the canonical JSON form of the key, hex encoded.
    pub fn hash(&self) -> EngineResult<String> {
        let canonical = canonical_json(serde_json::to_value(self)?);
        let bytes = serde_json::to_vec(&canonical)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Rebuilds a JSON value with every object's keys sorted.
fn canonical_json(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonical_json(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonical_json).collect()),
        other => other,
    }
}

/// Where a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServedFrom {
    Cache,
    Search,
}

/// Counters of cache activity.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    lookup_errors: AtomicU64,
    inserted: AtomicU64,
    duplicates: AtomicU64,
    write_errors: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub lookup_errors: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub write_errors: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            lookup_errors: self.lookup_errors.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Best-effort cache of computed payloads.
///
/// Cheap to clone; clones share the store and the counters.
#[derive(Clone)]
pub struct ResultCache {
    store: Option<Arc<dyn CacheStore>>,
    stats: Arc<CacheStats>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("store", &self.store.as_ref().map(|s| s.backend_name()))
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl ResultCache {
    /// Creates a cache over `store`, or a disabled one if the config says so.
    pub fn new(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self {
            store: config.enabled.then_some(store),
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Creates a cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            store: None,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Looks a payload up. Store failures read as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let store = self.store.as_ref()?;
        let hash = match key.hash() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, dataset_id = %key.dataset_id, "Failed to hash cache key");
                self.stats.lookup_errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        match store.get(&hash).await {
            Ok(Some(entry)) => {
                debug!(hash = %hash, kind = ?key.kind, "Cache hit");
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                warn!(error = %e, hash = %hash, backend = store.backend_name(), "Cache lookup failed");
                self.stats.lookup_errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Writes a payload in a background task.
    ///
    /// Returns the task handle, or `None` when nothing is written.
    pub fn put_detached(&self, key: &CacheKey, value: Bytes) -> Option<JoinHandle<()>> {
        let store = self.store.clone()?;
        let hash = match key.hash() {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, dataset_id = %key.dataset_id, "Failed to hash cache key");
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        let stats = Arc::clone(&self.stats);
        let entry = CacheEntry::new(hash, key.dataset_id.clone(), value);
        Some(tokio::spawn(async move {
            let hash = entry.hash.clone();
            match store.insert(entry).await {
                Ok(InsertOutcome::Inserted) => {
                    debug!(hash = %hash, "Cache entry inserted");
                    stats.inserted.fetch_add(1, Ordering::Relaxed);
                }
                Ok(InsertOutcome::Duplicate) => {
                    debug!(hash = %hash, "Cache entry already present");
                    stats.duplicates.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, hash = %hash, "Cache write failed");
                    stats.write_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
        }))
    }

    /// Returns the cached payload, or computes it and caches it in the
    /// background.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> EngineResult<(Bytes, ServedFrom)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EngineResult<Bytes>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok((value, ServedFrom::Cache));
        }
        let value = compute().await?;
        self.put_detached(key, value.clone());
        Ok((value, ServedFrom::Search))
    }

    /// Removes every entry of a dataset. Failures are logged.
    pub async fn evict_dataset(&self, dataset_id: &str) {
        let Some(store) = &self.store else {
            return;
        };
        match store.evict_dataset(dataset_id).await {
            Ok(removed) => debug!(dataset_id, removed, "Evicted cache entries"),
            Err(e) => warn!(error = %e, dataset_id, "Cache eviction failed"),
        }
    }
}
