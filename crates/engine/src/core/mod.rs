//! Collaborator traits.
//!
//! The engine never talks to a database directly. Every side effect goes
//! through one of these traits:
//!
//! - [`DocumentStore`] - dataset documents and REST rows
//! - [`SearchEngine`] - row search, counts and index mappings
//! - [`LockService`] - per-dataset advisory locks
//! - [`CacheStore`] - content-addressed result cache entries
//!
//! In-memory implementations live in [`crate::backends::memory`]; the
//! `elasticsearch` and `mongodb` features add production backends.
//!
//! # Example: a search engine that knows no rows
//!
//! ```ignore
//! use async_trait::async_trait;
//! use tessera_engine::core::SearchEngine;
//!
//! struct Empty;
//!
//! #[async_trait]
//! impl SearchEngine for Empty {
//!     fn backend_name(&self) -> &'static str {
//!         "empty"
//!     }
//!
//!     async fn count(&self, _dataset: &Dataset, _query: &SearchQuery) -> EngineResult<u64> {
//!         Ok(0)
//!     }
//!     // ...
//! }
//! ```

mod cache;
mod lock;
mod search;
mod store;

pub use cache::{CacheEntry, CacheStore, InsertOutcome};
pub use lock::{LockService, LockToken};
pub use search::SearchEngine;
pub use store::DocumentStore;
