use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{CacheEntry, CacheStore, InsertOutcome};
use crate::error::EngineResult;

#[derive(Debug, Default)]
struct Entries {
    by_hash: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

/// A capped in-memory cache store. The oldest entry goes first when full.
#[derive(Debug)]
pub struct MemoryCacheStore {
    capacity: usize,
    entries: Mutex<Entries>,
}

impl MemoryCacheStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, hash: &str) -> EngineResult<Option<CacheEntry>> {
        Ok(self.entries.lock().by_hash.get(hash).cloned())
    }

    async fn insert(&self, entry: CacheEntry) -> EngineResult<InsertOutcome> {
        let mut entries = self.entries.lock();
        if entries.by_hash.contains_key(&entry.hash) {
            return Ok(InsertOutcome::Duplicate);
        }
        while entries.by_hash.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.by_hash.remove(&oldest);
        }
        entries.order.push_back(entry.hash.clone());
        entries.by_hash.insert(entry.hash.clone(), entry);
        Ok(InsertOutcome::Inserted)
    }

    async fn evict_dataset(&self, dataset_id: &str) -> EngineResult<u64> {
        let mut entries = self.entries.lock();
        let before = entries.by_hash.len();
        entries.by_hash.retain(|_, e| e.dataset_id != dataset_id);
        let Entries { by_hash, order } = &mut *entries;
        order.retain(|hash| by_hash.contains_key(hash));
        Ok((before - by_hash.len()) as u64)
    }
}
