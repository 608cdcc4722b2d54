//! MongoDB document store, result cache and locks.
//!
//! | Collection | Content |
//! |------------|---------|
//! | `datasets` | dataset documents, keyed by `id` |
//! | `dataset-{id}` | rows of a REST dataset |
//! | `cache` | capped collection of cache entries, keyed by hash |
//! | `locks` | one document per held lock, expired by a TTL index |
//!
//! # Example
//!
//! ```ignore
//! use tessera_engine::backends::mongodb::{MongoConfig, MongoBackends};
//!
//! let backends = MongoBackends::connect(&MongoConfig::default()).await?;
//! let dataset = backends.store.find_dataset("abc").await?;
//! ```

mod cache;
mod lock;
mod store;

use std::sync::Arc;

use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Database};
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, EngineError};

pub use cache::MongoCacheStore;
pub use lock::MongoLockService;
pub use store::MongoDocumentStore;

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string (default: `mongodb://localhost:27017`).
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Database name (default: `"tessera"`).
    #[serde(default = "default_database")]
    pub database: String,

    /// Size of the capped cache collection in bytes (default: 1 GiB).
    #[serde(default = "default_cache_size_bytes")]
    pub cache_size_bytes: u64,

    /// Seconds after which a lock is considered abandoned (default: 60).
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "tessera".to_string()
}

fn default_cache_size_bytes() -> u64 {
    1024 * 1024 * 1024
}

fn default_lock_ttl_secs() -> u64 {
    60
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            database: default_database(),
            cache_size_bytes: default_cache_size_bytes(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

/// The three MongoDB collaborators sharing one client.
#[derive(Debug, Clone)]
pub struct MongoBackends {
    pub store: Arc<MongoDocumentStore>,
    pub cache: Arc<MongoCacheStore>,
    pub locks: Arc<MongoLockService>,
}

impl MongoBackends {
    /// Connects and prepares the cache and lock collections.
    pub async fn connect(config: &MongoConfig) -> Result<Self, EngineError> {
        let client = Client::with_uri_str(&config.uri).await?;
        let db = client.database(&config.database);
        Self::with_database(db, config).await
    }

    /// Prepares collaborators on an existing database handle.
    pub async fn with_database(db: Database, config: &MongoConfig) -> Result<Self, EngineError> {
        let cache = MongoCacheStore::init(&db, config.cache_size_bytes).await?;
        let locks = MongoLockService::init(&db, config.lock_ttl_secs).await?;
        tracing::info!(database = %config.database, "MongoDB backends ready");
        Ok(Self {
            store: Arc::new(MongoDocumentStore::new(&db)),
            cache: Arc::new(cache),
            locks: Arc::new(locks),
        })
    }
}

const DUPLICATE_KEY: i32 = 11000;
const NAMESPACE_EXISTS: i32 = 48;

pub(crate) fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

pub(crate) fn is_namespace_exists(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Command(command_error) if command_error.code == NAMESPACE_EXISTS
    )
}

pub(crate) fn serialization_error(err: impl std::fmt::Display) -> EngineError {
    EngineError::Backend(BackendError::SerializationError {
        message: err.to_string(),
    })
}
