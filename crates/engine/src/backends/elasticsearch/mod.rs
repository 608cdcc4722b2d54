//! Elasticsearch search engine.
//!
//! Every dataset is served by an alias `{prefix}-{dataset_id}` (and
//! `{prefix}_draft-{dataset_id}` while a draft is pending). Virtual datasets
//! search the aliases of their children in one request.
//!
//! # Example
//!
//! ```ignore
//! use tessera_engine::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchSearchEngine};
//!
//! let config = ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! };
//! let engine = ElasticsearchSearchEngine::new(config)?;
//! let total = engine.count(&dataset, &SearchQuery::new(0)).await?;
//! ```

mod client;
mod engine;
pub mod query;

pub use client::{ElasticsearchAuth, ElasticsearchConfig};
pub use engine::ElasticsearchSearchEngine;
