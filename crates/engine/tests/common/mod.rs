//! Shared fixtures for the engine integration tests.
//!
//! Datasets are built in their stored shape: the declared schema is replaced
//! by its extended schema, the way the processing pipeline writes it.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{Value, json};

use tessera_engine::backends::memory::{
    MemoryCacheStore, MemoryDocumentStore, MemoryLockService, MemorySearchEngine,
};
use tessera_engine::cache::ResultCache;
use tessera_engine::config::{CacheConfig, EngineConfig};
use tessera_engine::format::ResultFormatter;
use tessera_engine::planner::PatchService;
use tessera_engine::schema::geo::LAT_LON_URI;
use tessera_engine::schema::{Vocabulary, extended_schema};
use tessera_engine::types::{
    Dataset, DatasetStatus, Field, FieldType, FileInfo, RestConfig, UserRef,
};

/// Public URL used in next-page links.
pub const PUBLIC_URL: &str = "https://data.example.org";

/// Returns the dataset with its schema replaced by the extended schema.
pub fn stored(mut dataset: Dataset) -> Dataset {
    dataset.schema = extended_schema(&dataset, Vocabulary::standard(), None);
    dataset
}

/// A finalized file dataset with the given declared schema.
pub fn file_dataset(id: &str, schema: Vec<Field>) -> Dataset {
    let mut dataset = Dataset::new(id);
    dataset.title = Some(format!("Dataset {}", id));
    dataset.status = DatasetStatus::Finalized;
    dataset.file = Some(FileInfo {
        name: format!("{}.csv", id),
        size: 2048,
        mimetype: Some("text/csv".to_string()),
    });
    dataset.schema = schema;
    stored(dataset)
}

/// A finalized REST dataset with the given declared schema.
pub fn rest_dataset(id: &str, schema: Vec<Field>, rest: RestConfig) -> Dataset {
    let mut dataset = Dataset::new(id);
    dataset.title = Some(format!("Dataset {}", id));
    dataset.status = DatasetStatus::Finalized;
    dataset.is_rest = true;
    dataset.rest = Some(rest);
    dataset.schema = schema;
    stored(dataset)
}

/// The schema of the station fixtures: a name, a count and a position.
pub fn station_schema() -> Vec<Field> {
    vec![
        Field::new("name", FieldType::String).with_title("Name"),
        Field::new("count", FieldType::Integer),
        Field::new("position", FieldType::String).with_refers_to(LAT_LON_URI),
    ]
}

/// Stations around Lyon, plus one in Paris.
pub fn station_rows() -> Vec<Value> {
    vec![
        station("1", "Part-Dieu", 12, 45.7606, 4.8593),
        station("2", "Bellecour", 7, 45.7578, 4.8320),
        station("3", "Perrache", 9, 45.7485, 4.8257),
        station("4", "Vaise", 3, 45.7797, 4.8050),
        station("5", "Gare du Nord", 20, 48.8809, 2.3553),
    ]
}

fn station(id: &str, name: &str, count: i64, lat: f64, lon: f64) -> Value {
    let position = format!("{},{}", lat, lon);
    json!({
        "_id": id,
        "_i": id.parse::<u64>().unwrap_or_default(),
        "name": name,
        "count": count,
        "position": position,
        "_geopoint": position,
    })
}

pub fn user() -> UserRef {
    UserRef {
        id: "alban".to_string(),
        name: "Alban M.".to_string(),
    }
}

/// Memory collaborators shared by a service and a formatter.
pub struct Harness {
    pub store: Arc<MemoryDocumentStore>,
    pub search: Arc<MemorySearchEngine>,
    pub locks: Arc<MemoryLockService>,
    pub cache_store: Arc<MemoryCacheStore>,
    pub cache: ResultCache,
    pub config: EngineConfig,
}

impl Harness {
    /// Stores the datasets and indexes their current schema.
    pub fn new(datasets: Vec<Dataset>) -> Self {
        let search = Arc::new(MemorySearchEngine::new());
        for dataset in &datasets {
            search.create_index(&dataset.id, dataset.schema.clone());
        }
        let store = Arc::new(
            MemoryDocumentStore::with_datasets(datasets).expect("fixtures serialize"),
        );
        let cache_store = Arc::new(MemoryCacheStore::new(1000));
        let cache = ResultCache::new(cache_store.clone(), &CacheConfig::default());
        let config = EngineConfig {
            public_url: PUBLIC_URL.to_string(),
            ..Default::default()
        };
        Self {
            store,
            search,
            locks: Arc::new(MemoryLockService::new()),
            cache_store,
            cache,
            config,
        }
    }

    pub fn service(&self) -> PatchService {
        PatchService::new(
            self.store.clone(),
            self.search.clone(),
            self.locks.clone(),
            self.cache.clone(),
        )
    }

    pub fn formatter(&self) -> ResultFormatter {
        ResultFormatter::new(self.search.clone(), self.cache.clone(), self.config.clone())
    }

    /// Waits for background cache writes to land.
    pub async fn settle_cache(&self, expected: usize) {
        for _ in 0..100 {
            if self.cache_store.len() >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}
