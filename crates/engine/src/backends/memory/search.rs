use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::core::SearchEngine;
use crate::error::{EngineResult, IndexError};
use crate::schema::mapping::{alias_name, mapping_conflicts, search_targets};
use crate::types::{Dataset, Field, SearchHit, SearchQuery, SearchResponse, SortField};

const PREFIX: &str = "dataset";

#[derive(Debug, Default, Clone)]
struct MemoryIndex {
    schema: Vec<Field>,
    rows: Vec<Value>,
}

/// A search engine scanning rows held in memory.
///
/// Filters match on the string form of a value, full-text queries are
/// case-insensitive substring matches and geographic restrictions read the
/// `_geopoint` field (`"lat,lon"`).
#[derive(Debug, Default)]
pub struct MemorySearchEngine {
    indices: RwLock<HashMap<String, MemoryIndex>>,
}

impl MemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces the index of a dataset.
    pub fn create_index(&self, dataset_id: &str, schema: Vec<Field>) {
        self.indices.write().insert(
            alias_name(PREFIX, dataset_id, false),
            MemoryIndex {
                schema,
                rows: Vec::new(),
            },
        );
    }

    /// Appends rows to the index of a dataset, creating it when missing.
    pub fn index_rows(&self, dataset_id: &str, rows: Vec<Value>) {
        self.index_rows_at(alias_name(PREFIX, dataset_id, false), rows);
    }

    /// Appends rows to the draft index of a dataset.
    pub fn index_draft_rows(&self, dataset_id: &str, rows: Vec<Value>) {
        self.index_rows_at(alias_name(PREFIX, dataset_id, true), rows);
    }

    fn index_rows_at(&self, alias: String, rows: Vec<Value>) {
        self.indices.write().entry(alias).or_default().rows.extend(rows);
    }

    /// Returns the schema last mapped on the index of a dataset.
    pub fn mapping(&self, dataset_id: &str) -> Option<Vec<Field>> {
        self.indices
            .read()
            .get(&alias_name(PREFIX, dataset_id, false))
            .map(|index| index.schema.clone())
    }

    fn matching_rows(&self, dataset: &Dataset, query: &SearchQuery) -> Vec<Value> {
        let indices = self.indices.read();
        search_targets(PREFIX, dataset)
            .iter()
            .filter_map(|alias| indices.get(alias))
            .flat_map(|index| index.rows.iter())
            .filter(|row| row_matches(row, query))
            .cloned()
            .collect()
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn filter_matches(row: &Value, key: &str, expected: &str) -> bool {
    match row.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| value_text(item).as_deref() == Some(expected)),
        Some(value) => value_text(value).as_deref() == Some(expected),
        None => false,
    }
}

fn text_matches(row: &Value, q: &str) -> bool {
    let needle = q.to_lowercase();
    row.as_object().is_some_and(|object| {
        object
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter_map(|(_, value)| value.as_str())
            .any(|text| text.to_lowercase().contains(&needle))
    })
}

fn geopoint(row: &Value) -> Option<(f64, f64)> {
    let (lat, lon) = row.get("_geopoint")?.as_str()?.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn in_bbox(row: &Value, [west, south, east, north]: [f64; 4]) -> bool {
    geopoint(row).is_some_and(|(lat, lon)| {
        lat >= south && lat <= north && lon >= west && lon <= east
    })
}

fn row_matches(row: &Value, query: &SearchQuery) -> bool {
    query
        .filters
        .iter()
        .all(|(key, expected)| filter_matches(row, key, expected))
        && query.q.as_deref().is_none_or(|q| text_matches(row, q))
        && query.tile.is_none_or(|tile| in_bbox(row, tile.bbox()))
        && query.bbox.is_none_or(|bbox| in_bbox(row, bbox))
}

/// Orders JSON values the way a search index sorts them; missing values last.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or_default()
            .total_cmp(&y.as_f64().unwrap_or_default()),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn compare_sort_values(a: &[Value], b: &[Value], sort: &[SortField]) -> Ordering {
    for ((x, y), field) in a.iter().zip(b).zip(sort) {
        let ordering = compare_values(x, y);
        let ordering = if field.descending && !x.is_null() && !y.is_null() {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn to_hit(row: Value, sort: &[SortField], select: Option<&[String]>) -> SearchHit {
    let sort_values = sort
        .iter()
        .map(|field| row.get(&field.key).cloned().unwrap_or(Value::Null))
        .collect();
    let id = row
        .get("_id")
        .and_then(value_text)
        .unwrap_or_default();
    let mut source = match row {
        Value::Object(object) => object,
        _ => Map::new(),
    };
    if let Some(select) = select {
        source.retain(|key, _| select.contains(key));
    }
    SearchHit {
        id,
        source,
        sort: sort_values,
    }
}

#[async_trait]
impl SearchEngine for MemorySearchEngine {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn count(&self, dataset: &Dataset, query: &SearchQuery) -> EngineResult<u64> {
        Ok(self.matching_rows(dataset, query).len() as u64)
    }

    async fn search(&self, dataset: &Dataset, query: &SearchQuery) -> EngineResult<SearchResponse> {
        let sort = query.stable_sort();
        let rows = self.matching_rows(dataset, query);
        let total = rows.len() as u64;

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .map(|row| to_hit(row, &sort, query.select.as_deref()))
            .collect();
        hits.sort_by(|a, b| compare_sort_values(&a.sort, &b.sort, &sort));
        if let Some(after) = &query.after {
            hits.retain(|hit| compare_sort_values(&hit.sort, after, &sort) == Ordering::Greater);
        }
        hits.truncate(usize::try_from(query.size).unwrap_or(usize::MAX));

        Ok(SearchResponse { total, hits })
    }

    async fn update_mapping(&self, dataset_id: &str, schema: &[Field]) -> EngineResult<()> {
        let mut indices = self.indices.write();
        let index = indices
            .get_mut(&alias_name(PREFIX, dataset_id, false))
            .ok_or_else(|| IndexError::IndexNotFound {
                dataset_id: dataset_id.to_string(),
            })?;
        let conflicts = mapping_conflicts(&index.schema, schema);
        if !conflicts.is_empty() {
            return Err(IndexError::MappingIncompatible {
                dataset_id: dataset_id.to_string(),
                reason: format!("type changed for {}", conflicts.join(", ")),
            }
            .into());
        }
        index.schema = schema.to_vec();
        Ok(())
    }

    async fn delete(&self, dataset_id: &str) -> EngineResult<()> {
        let mut indices = self.indices.write();
        indices.remove(&alias_name(PREFIX, dataset_id, false));
        indices.remove(&alias_name(PREFIX, dataset_id, true));
        Ok(())
    }
}
