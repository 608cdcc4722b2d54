//! Result cache storage.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::EngineResult;

/// One cached payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Content hash of the request.
    pub hash: String,
    /// Dataset the payload was computed from.
    pub dataset_id: String,
    pub value: Bytes,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(hash: impl Into<String>, dataset_id: impl Into<String>, value: Bytes) -> Self {
        Self {
            hash: hash.into(),
            dataset_id: dataset_id.into(),
            value,
            created_at: Utc::now(),
        }
    }
}

/// Outcome of a cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// An entry with the same hash exists and was kept.
    Duplicate,
}

/// A bounded store of cache entries.
///
/// Entries are never overwritten, the first writer wins. Entries can vanish
/// at any time when the store is full.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns a short name for logs.
    fn backend_name(&self) -> &'static str;

    async fn get(&self, hash: &str) -> EngineResult<Option<CacheEntry>>;

    async fn insert(&self, entry: CacheEntry) -> EngineResult<InsertOutcome>;

    /// Removes every entry of a dataset. Returns the number removed.
    async fn evict_dataset(&self, dataset_id: &str) -> EngineResult<u64>;
}
