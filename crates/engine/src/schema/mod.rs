//! Schema analysis.
//!
//! - [`evolution`]: structural comparison and breaking changes
//! - [`extended`]: the declared schema plus computed fields
//! - [`virtual_schema`]: schema of a virtual dataset from its children
//! - [`mapping`]: search index mapping
//! - [`geo`]: geographic concepts
//! - [`vocabulary`]: concept vocabularies

pub mod evolution;
pub mod extended;
pub mod geo;
pub mod mapping;
pub mod virtual_schema;
pub mod vocabulary;

pub use evolution::{
    BreakingChange, BreakingChangeKind, BreakingChangeOptions, breaking_changes,
    breaking_changes_with, has_validation_rules, structurally_equal, validation_compatible,
};
pub use extended::extended_schema;
pub use mapping::{alias_name, index_mapping, mapping_conflicts};
pub use virtual_schema::union_schema;
pub use vocabulary::{Concept, Vocabulary};
