//! Collaborator implementations.
//!
//! | Backend | Feature | Implements |
//! |---------|---------|------------|
//! | [`memory`] | always | `DocumentStore`, `SearchEngine`, `LockService`, `CacheStore` |
//! | `elasticsearch` | `elasticsearch` | `SearchEngine` |
//! | `mongodb` | `mongodb` | `DocumentStore`, `LockService`, `CacheStore` |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "elasticsearch")]
//! use tessera_engine::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchSearchEngine};
//!
//! # #[cfg(feature = "elasticsearch")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ElasticsearchSearchEngine::new(ElasticsearchConfig::default())?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

#[cfg(feature = "mongodb")]
pub mod mongodb;
