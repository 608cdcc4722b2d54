//! Error types for the engine.
//!
//! Errors follow a hierarchy that separates caller mistakes (validation and
//! breaking-change conflicts) from recoverable index incompatibilities and
//! from genuine infrastructure failures.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::schema::evolution::BreakingChange;
use crate::tiles::TileCoord;

/// The primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Patch or request validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Breaking schema changes where none were allowed
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Search index errors
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Tile sampling errors
    #[error(transparent)]
    Sampling(#[from] SamplingError),

    /// Result cache errors
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Advisory lock errors
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl EngineError {
    /// Returns true when a mapping update could not be applied to the live
    /// index, either because the mapping is incompatible or because there is
    /// no index yet. Callers recover by reindexing.
    pub fn is_recoverable_index_error(&self) -> bool {
        matches!(self, EngineError::Index(_))
    }

    /// Returns the message that may be shown to an end user.
    ///
    /// Validation and conflict errors are returned verbatim. Infrastructure
    /// errors collapse to a generic text so that query bodies and connection
    /// strings never leak.
    pub fn public_message(&self) -> String {
        match self {
            EngineError::Validation(e) => e.to_string(),
            EngineError::Conflict(e) => e.to_string(),
            EngineError::Lock(e) => e.to_string(),
            EngineError::Sampling(_) => "tile sampling is temporarily unavailable".to_string(),
            EngineError::Index(_) | EngineError::Cache(_) | EngineError::Backend(_) => {
                "internal error".to_string()
            }
        }
    }
}

/// A field-level detail attached to a validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDetail {
    /// The field key or patch path the detail applies to.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationDetail {
    /// Creates a new detail.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised before any side effect because the input is invalid.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("dataset not found: {id}")]
    DatasetNotFound { id: String },

    #[error("dataset {id} is not ready to be read (status {status})")]
    DatasetNotReady { id: String, status: String },

    #[error("cannot change primary key mode")]
    PrimaryKeyModeChange { current: String, requested: String },

    #[error("calculated fields cannot be submitted: {}", keys.join(", "))]
    CalculatedField { keys: Vec<String> },

    #[error("children of the virtual dataset have contradictory types for field {key}")]
    IncompatibleChildren {
        key: String,
        details: Vec<ValidationDetail>,
    },

    #[error("invalid tile coordinates: {input}")]
    InvalidTile { input: String },

    #[error("invalid pagination cursor: {cursor}")]
    InvalidCursor { cursor: String },

    #[error("unsupported output format: {format}")]
    InvalidFormat { format: String },

    #[error("invalid patch: {message}")]
    InvalidPatch {
        message: String,
        details: Vec<ValidationDetail>,
    },
}

impl ValidationError {
    /// Returns the field-level details carried by this error.
    pub fn details(&self) -> Vec<ValidationDetail> {
        match self {
            ValidationError::IncompatibleChildren { details, .. }
            | ValidationError::InvalidPatch { details, .. } => details.clone(),
            ValidationError::CalculatedField { keys } => keys
                .iter()
                .map(|k| ValidationDetail::new(k.as_str(), "calculated field"))
                .collect(),
            ValidationError::PrimaryKeyModeChange { current, requested } => {
                vec![ValidationDetail::new(
                    "rest.primaryKeyMode",
                    format!("{} cannot become {}", current, requested),
                )]
            }
            _ => Vec::new(),
        }
    }
}

/// Structural schema changes found where only compatible changes were allowed.
#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("breaking schema changes: {}", format_changes(changes))]
    BreakingChanges { changes: Vec<BreakingChange> },
}

fn format_changes(changes: &[BreakingChange]) -> String {
    changes
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the search index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The live index cannot absorb the new mapping in place.
    #[error("mapping of dataset {dataset_id} cannot be updated in place: {reason}")]
    MappingIncompatible { dataset_id: String, reason: String },

    #[error("no index for dataset {dataset_id}")]
    IndexNotFound { dataset_id: String },
}

/// Errors computing an adaptive tile sample.
#[derive(Error, Debug)]
pub enum SamplingError {
    #[error("count query failed for neighbor tile {tile}")]
    NeighborCount {
        tile: TileCoord,
        #[source]
        source: Box<EngineError>,
    },
}

/// Errors from the result cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache store unavailable: {message}")]
    Unavailable { message: String },

    #[error("corrupt cache entry {hash}")]
    Corrupt { hash: String },
}

/// Errors from the advisory lock service.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("dataset {key} is locked by another operation")]
    Busy { key: String },
}

/// Errors from external systems.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("query error: {message}")]
    QueryError { message: String },

    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<zip::result::ZipError> for EngineError {
    fn from(err: zip::result::ZipError) -> Self {
        EngineError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Internal {
            backend_name: "io".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Backend(err.into())
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        EngineError::Backend(BackendError::Internal {
            backend_name: "mongodb".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "elasticsearch")]
impl From<elasticsearch::Error> for EngineError {
    fn from(err: elasticsearch::Error) -> Self {
        EngineError::Backend(BackendError::Internal {
            backend_name: "elasticsearch".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}
