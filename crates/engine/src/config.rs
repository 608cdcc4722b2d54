//! Engine configuration.
//!
//! All thresholds used by the tile sampler, the result cache and the
//! formatter live here. Every field has a serde default, so a configuration
//! file only needs to name what it overrides.
//!
//! # Example
//!
//! ```rust
//! use tessera_engine::EngineConfig;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{
//!     "sampling": {"maxTileBytes": 20000000},
//!     "cache": {"enabled": false}
//! }"#).unwrap();
//! assert_eq!(config.sampling.max_tile_bytes, 20_000_000);
//! assert_eq!(config.sampling.low_density_divisor, 20);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::tiles::{LOW_DENSITY_DIVISOR, MAX_TILE_BYTES};

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Tile sampling thresholds.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Page sizes.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Public base URL used to build next-page links (default: `http://localhost:8080`).
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Prefix of search index names (default: `"dataset"`).
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_index_prefix() -> String {
    "dataset".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            cache: CacheConfig::default(),
            pagination: PaginationConfig::default(),
            public_url: default_public_url(),
            index_prefix: default_index_prefix(),
        }
    }
}

impl EngineConfig {
    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.sampling.low_density_divisor == 0 {
            errors.push("Low density divisor cannot be 0".to_string());
        }

        if self.sampling.neighbor_concurrency == 0 {
            errors.push("Neighbor concurrency cannot be 0".to_string());
        }

        if self.sampling.default_tile_size == 0 {
            errors.push("Default tile size cannot be 0".to_string());
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            errors.push("Cache max entries cannot be 0 when the cache is enabled".to_string());
        }

        if self.pagination.default_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.pagination.default_size > self.pagination.max_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if url::Url::parse(&self.public_url).is_err() {
            errors.push(format!("Public URL is not a valid URL: {}", self.public_url));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Tile sampling thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingConfig {
    /// Tiles with at most `size / low_density_divisor` features are not sampled (default: 20).
    #[serde(default = "default_low_density_divisor")]
    pub low_density_divisor: u64,

    /// Estimated payload above which geometries are dropped (default: 50 MB).
    #[serde(default = "default_max_tile_bytes")]
    pub max_tile_bytes: u64,

    /// Concurrent neighbor count queries (default: 8).
    #[serde(default = "default_neighbor_concurrency")]
    pub neighbor_concurrency: usize,

    /// Tile size when the request does not name one (default: 10000).
    #[serde(default = "default_tile_size")]
    pub default_tile_size: u64,
}

fn default_low_density_divisor() -> u64 {
    LOW_DENSITY_DIVISOR
}

fn default_max_tile_bytes() -> u64 {
    MAX_TILE_BYTES
}

fn default_neighbor_concurrency() -> usize {
    8
}

fn default_tile_size() -> u64 {
    10_000
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            low_density_divisor: default_low_density_divisor(),
            max_tile_bytes: default_max_tile_bytes(),
            neighbor_concurrency: default_neighbor_concurrency(),
            default_tile_size: default_tile_size(),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Whether tiles and counts are cached (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Capacity of the in-memory store (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_max_entries(),
        }
    }
}

/// Page sizes of row listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    /// Page size when the request does not name one (default: 12).
    #[serde(default = "default_page_size")]
    pub default_size: u64,

    /// Largest accepted page size (default: 10000).
    #[serde(default = "default_max_page_size")]
    pub max_size: u64,
}

fn default_page_size() -> u64 {
    12
}

fn default_max_page_size() -> u64 {
    10_000
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_size: default_page_size(),
            max_size: default_max_page_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampling.low_density_divisor, 20);
        assert_eq!(config.sampling.max_tile_bytes, 50_000_000);
        assert_eq!(config.sampling.neighbor_concurrency, 8);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_validate_collects_errors() {
        let config = EngineConfig {
            sampling: SamplingConfig {
                low_density_divisor: 0,
                neighbor_concurrency: 0,
                ..Default::default()
            },
            pagination: PaginationConfig {
                default_size: 20_000,
                max_size: 10_000,
            },
            public_url: "not a url".to_string(),
            ..Default::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
