//! In-process backends.
//!
//! Used by tests and the CLI. Everything lives behind `parking_lot` locks and
//! is lost when the value is dropped.

mod cache;
mod lock;
mod search;
mod store;

pub use cache::MemoryCacheStore;
pub use lock::MemoryLockService;
pub use search::MemorySearchEngine;
pub use store::MemoryDocumentStore;
