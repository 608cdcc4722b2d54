//! Map tile requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::search::{SearchQuery, SortField};
use crate::tiles::TileCoord;

/// Sort used for tiles when none is requested: an unbiased random order.
pub const DEFAULT_TILE_SORT: &str = "_rand";

/// How features of a dense tile are sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingMode {
    /// Adapt the sample size to the density of neighbor tiles.
    #[default]
    Neighbors,
    /// Always return up to the requested size.
    Max,
}

/// A request for one map tile of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRequest {
    /// Dataset identifier.
    pub dataset_id: String,
    /// Tile coordinates.
    pub coord: TileCoord,
    /// Exact-match filters, kept sorted so that request keys are stable.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// Full-text query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Requested maximum feature count.
    pub size: u64,
    /// Selected fields, all when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Sort criteria, random when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    /// Sampling mode.
    #[serde(default)]
    pub sampling: SamplingMode,
}

impl TileRequest {
    /// Creates a request for a tile with default options.
    pub fn new(dataset_id: impl Into<String>, coord: TileCoord, size: u64) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            coord,
            filters: BTreeMap::new(),
            q: None,
            size,
            select: None,
            sort: Vec::new(),
            sampling: SamplingMode::default(),
        }
    }

    /// Adds an exact-match filter.
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Returns the query part of the request used for cache keys.
    ///
    /// The dataset id is not part of it, it is keyed separately.
    pub fn cache_query(&self) -> Value {
        json!({
            "xyz": [self.coord.x, self.coord.y, self.coord.z],
            "filters": self.filters,
            "q": self.q,
            "size": self.size,
            "select": self.select,
            "sort": self.sort,
        })
    }

    /// Returns the search query for this tile before sampling.
    pub fn search_query(&self) -> SearchQuery {
        let sort = if self.sort.is_empty() {
            vec![SortField::asc(DEFAULT_TILE_SORT)]
        } else {
            self.sort.clone()
        };
        SearchQuery {
            filters: self.filters.clone(),
            q: self.q.clone(),
            tile: Some(self.coord),
            select: self.select.clone(),
            sort,
            size: self.size,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_query_is_filter_order_independent() {
        let coord = TileCoord::new(4, 5, 4).unwrap();
        let a = TileRequest::new("ds", coord, 100)
            .with_filter("city", "Lyon")
            .with_filter("kind", "bus");
        let b = TileRequest::new("ds", coord, 100)
            .with_filter("kind", "bus")
            .with_filter("city", "Lyon");
        assert_eq!(a.cache_query().to_string(), b.cache_query().to_string());
    }

    #[test]
    fn test_search_query_defaults_to_random_sort() {
        let coord = TileCoord::new(0, 0, 0).unwrap();
        let query = TileRequest::new("ds", coord, 10).search_query();
        assert_eq!(query.sort, vec![SortField::asc("_rand")]);
        assert_eq!(query.tile, Some(coord));
        assert_eq!(query.size, 10);
    }
}
