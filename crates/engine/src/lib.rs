//! Tessera dataset engine
//!
//! This crate holds the decision logic of a dataset publishing platform:
//! what happens to a published dataset when its owner edits it, and how its
//! rows are served back as pages, exports and map tiles.
//!
//! # Features
//!
//! - **Patch planning**: an ordered decision table resolves every edit to a
//!   lifecycle status, a store update and the side effects to run
//! - **Schema evolution**: structural comparison, breaking change reports and
//!   extended schemas with computed fields
//! - **Adaptive tiles**: dense map tiles are sampled by the density of their
//!   neighbors, encoded as vector tiles and cached by content hash
//! - **Outputs**: JSON pages with stable cursors, CSV streams, spreadsheets,
//!   GeoJSON and WKT
//!
//! # Backend Features
//!
//! In-memory collaborators are always available. Production backends are
//! enabled with feature flags:
//!
//! ```toml
//! [dependencies]
//! tessera-engine = { version = "0.1", features = ["elasticsearch", "mongodb"] }
//! ```
//!
//! # Architecture
//!
//! - [`types`] - datasets, fields, patches and queries
//! - [`schema`] - schema comparison, extended schemas and index mappings
//! - [`planner`] - patch planning and application
//! - [`tiles`] - tile coordinates, sampling and vector tile encoding
//! - [`cache`] - the content-addressed result cache
//! - [`format`] - output formats
//! - [`core`] - collaborator traits
//! - [`backends`] - collaborator implementations
//! - [`config`] - engine configuration
//! - [`error`] - error types
//!
//! # Quick Start
//!
//! ```
//! use chrono::Utc;
//! use tessera_engine::planner::{PatchPlanner, PlanContext};
//! use tessera_engine::types::{Dataset, DatasetPatch, DatasetStatus, Field, FieldType};
//!
//! let mut dataset = Dataset::new("stations");
//! dataset.status = DatasetStatus::Finalized;
//! dataset.schema = vec![Field::new("name", FieldType::String)];
//!
//! let patch = DatasetPatch {
//!     schema: Some(vec![Field::new("name", FieldType::Integer)]),
//!     ..Default::default()
//! };
//! let plan = PatchPlanner::new()
//!     .plan(&dataset, &patch, &PlanContext::new(Utc::now()))
//!     .unwrap();
//!
//! assert_eq!(plan.status, DatasetStatus::Analyzed);
//! assert!(plan.attempt_mapping_update);
//! assert_eq!(plan.breaking_changes.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod format;
pub mod planner;
pub mod schema;
pub mod tiles;
pub mod types;

// Re-export commonly used types at crate root
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use types::{Dataset, DatasetPatch, DatasetStatus, Field, FieldType};

// Re-export the main entry points
pub use cache::ResultCache;
pub use format::{FormattedOutput, LinesQuery, OutputFormat, ResultFormatter};
pub use planner::{PatchOptions, PatchPlan, PatchPlanner, PatchService, PlanContext};

// Re-export core traits
pub use core::{CacheStore, DocumentStore, LockService, SearchEngine};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
