//! Command line configuration for the `tessera` binary.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TESSERA_LOG_LEVEL` | warn | Log level |
//! | `TESSERA_CONFIG` | - | Engine configuration file (JSON) |
//! | `TESSERA_PRETTY` | false | Pretty-print JSON output |

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tessera_engine::EngineConfig;

/// Offline tools over the dataset engine.
#[derive(Debug, Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliConfig {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true, env = "TESSERA_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Engine configuration file. Defaults apply to every missing key.
    #[arg(short, long, global = true, env = "TESSERA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Pretty-print JSON output.
    #[arg(long, global = true, env = "TESSERA_PRETTY")]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the `tessera` binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Plan a patch against a stored dataset and print the plan
    Plan {
        /// Stored dataset document (JSON file)
        #[arg(long)]
        dataset: PathBuf,
        /// Patch body (JSON file)
        #[arg(long)]
        patch: PathBuf,
        /// Plan the patch as a draft
        #[arg(long)]
        draft: bool,
        /// Refuse patches that break the schema
        #[arg(long)]
        forbid_breaking_changes: bool,
        /// Clock used for timestamps (RFC 3339, defaults to now)
        #[arg(long)]
        now: Option<String>,
    },
    /// List the breaking changes between two schemas
    BreakingChanges {
        /// Current schema (JSON array of fields)
        #[arg(long)]
        old: PathBuf,
        /// Patched schema (JSON array of fields)
        #[arg(long)]
        new: PathBuf,
        /// Also report added fields
        #[arg(long)]
        strict: bool,
        /// Skip extension fields
        #[arg(long)]
        ignore_extensions: bool,
    },
    /// Print the extended schema of a dataset
    ExtendedSchema {
        /// Dataset document (JSON file)
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Print the search index mapping of a dataset
    Mapping {
        /// Dataset document (JSON file)
        #[arg(long)]
        dataset: PathBuf,
    },
    /// Print the sampling decision of a tile from known counts
    Sample {
        /// Tile as z/x/y
        #[arg(long, default_value = "10/525/365")]
        tile: String,
        /// Requested feature count (defaults to the configured tile size)
        #[arg(long)]
        size: Option<u64>,
        /// Count of the tile followed by the counts of its neighbors
        #[arg(long, value_delimiter = ',', required = true)]
        counts: Vec<u64>,
        /// Estimated indexed size of one row, in bytes
        #[arg(long)]
        mean_row_size: Option<u64>,
    },
    /// Print the bounding box of a tile
    TileBbox {
        /// Tile as z/x/y or x,y,z
        tile: String,
    },
}

impl CliConfig {
    /// Loads the engine configuration file, or the defaults without one.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        match &self.config {
            Some(path) => read_json(path),
            None => Ok(EngineConfig::default()),
        }
    }
}

/// Reads and deserializes a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}
