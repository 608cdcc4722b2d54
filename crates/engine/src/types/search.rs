//! Search queries and raw search engine results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tiles::TileCoord;

/// Key appended to every sort so that cursors are stable.
pub const TIEBREAK_KEY: &str = "_id";

/// A sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    /// Field key.
    pub key: String,
    /// Descending order.
    #[serde(default)]
    pub descending: bool,
}

impl SortField {
    /// Ascending sort on a key.
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: false,
        }
    }

    /// Descending sort on a key.
    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            descending: true,
        }
    }

    /// Parses a comma-separated sort expression (`-date,name`).
    pub fn parse_list(expr: &str) -> Vec<SortField> {
        expr.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('-') {
                Some(key) => SortField::desc(key),
                None => SortField::asc(s),
            })
            .collect()
    }
}

/// A query against one dataset's index.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    /// Exact-match filters, field key to value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
    /// Full-text query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    /// Restricts results to a map tile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile: Option<TileCoord>,
    /// Restricts results to a bounding box `[west, south, east, north]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// Fields to return, all when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Sort criteria.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    /// Maximum number of hits.
    pub size: u64,
    /// Sort values of the last hit of the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Vec<Value>>,
}

impl SearchQuery {
    /// Creates a query returning at most `size` hits.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Adds an exact-match filter.
    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Restricts the query to a tile.
    pub fn with_tile(mut self, tile: TileCoord) -> Self {
        self.tile = Some(tile);
        self
    }

    /// Sets the sort criteria.
    pub fn with_sort(mut self, sort: Vec<SortField>) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the returned fields.
    pub fn with_select(mut self, select: Vec<String>) -> Self {
        self.select = Some(select);
        self
    }

    /// Returns the sort criteria with the tiebreaker appended.
    pub fn stable_sort(&self) -> Vec<SortField> {
        let mut sort = self.sort.clone();
        if !sort.iter().any(|s| s.key == TIEBREAK_KEY) {
            sort.push(SortField::asc(TIEBREAK_KEY));
        }
        sort
    }

    /// Returns the same query for counting: no paging, no projection.
    pub fn count_query(&self) -> SearchQuery {
        SearchQuery {
            filters: self.filters.clone(),
            q: self.q.clone(),
            tile: self.tile,
            bbox: self.bbox,
            ..Default::default()
        }
    }
}

/// One row returned by the search engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchHit {
    /// Row identifier.
    pub id: String,
    /// Stored row values.
    pub source: Map<String, Value>,
    /// Sort values, used to build the next-page cursor.
    #[serde(default)]
    pub sort: Vec<Value>,
}

/// A page of hits plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Total number of matching rows.
    pub total: u64,
    /// Returned rows.
    pub hits: Vec<SearchHit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sort_list() {
        assert_eq!(
            SortField::parse_list("-date, name,,"),
            vec![SortField::desc("date"), SortField::asc("name")]
        );
        assert!(SortField::parse_list("").is_empty());
    }

    #[test]
    fn test_stable_sort_appends_tiebreak_once() {
        let query = SearchQuery::new(10).with_sort(vec![SortField::desc("date")]);
        assert_eq!(
            query.stable_sort(),
            vec![SortField::desc("date"), SortField::asc("_id")]
        );
        let query = SearchQuery::new(10).with_sort(vec![SortField::desc("_id")]);
        assert_eq!(query.stable_sort(), vec![SortField::desc("_id")]);
    }

    #[test]
    fn test_count_query_drops_paging() {
        let query = SearchQuery::new(10)
            .with_filter("city", "Lyon")
            .with_select(vec!["a".to_string()])
            .with_sort(vec![SortField::asc("a")]);
        let count = query.count_query();
        assert_eq!(count.size, 0);
        assert_eq!(count.select, None);
        assert!(count.sort.is_empty());
        assert_eq!(count.filters.get("city").map(String::as_str), Some("Lyon"));
    }
}
