//! Translation of [`SearchQuery`] into Elasticsearch request bodies.

use serde_json::{Map, Value, json};

use crate::schema::mapping::search_fields;
use crate::types::{Field, SearchHit, SearchQuery, SearchResponse};

fn bool_query(schema: &[Field], query: &SearchQuery) -> Value {
    let mut filter: Vec<Value> = query
        .filters
        .iter()
        .map(|(key, value)| json!({"term": {key: value}}))
        .collect();

    let bbox = query.bbox.or_else(|| query.tile.map(|tile| tile.bbox()));
    if let Some([west, south, east, north]) = bbox {
        filter.push(json!({
            "geo_bounding_box": {
                "_geopoint": {
                    "top_left": {"lat": north, "lon": west},
                    "bottom_right": {"lat": south, "lon": east},
                }
            }
        }));
    }

    let mut must = Vec::new();
    if let Some(q) = query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        must.push(json!({
            "simple_query_string": {
                "query": q,
                "fields": search_fields(schema),
                "default_operator": "and",
            }
        }));
    }

    json!({"bool": {"filter": filter, "must": must}})
}

/// Builds the body of a search request.
pub fn search_body(schema: &[Field], query: &SearchQuery) -> Value {
    let sort: Vec<Value> = query
        .stable_sort()
        .iter()
        .map(|field| {
            let order = if field.descending { "desc" } else { "asc" };
            json!({&field.key: {"order": order}})
        })
        .collect();

    let mut body = Map::new();
    body.insert("query".to_string(), bool_query(schema, query));
    body.insert("size".to_string(), json!(query.size));
    body.insert("sort".to_string(), Value::Array(sort));
    body.insert("track_total_hits".to_string(), Value::Bool(true));
    if let Some(after) = &query.after {
        body.insert("search_after".to_string(), Value::Array(after.clone()));
    }
    if let Some(select) = &query.select {
        body.insert("_source".to_string(), json!(select));
    }
    Value::Object(body)
}

/// Builds the body of a count request.
pub fn count_body(schema: &[Field], query: &SearchQuery) -> Value {
    json!({"query": bool_query(schema, query)})
}

/// Reads hits and total from a search response body.
pub fn parse_search_response(body: &Value) -> SearchResponse {
    let total = body
        .pointer("/hits/total/value")
        .and_then(Value::as_u64)
        .unwrap_or_default();
    let hits = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| SearchHit {
                    id: hit
                        .get("_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    source: hit
                        .get("_source")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default(),
                    sort: hit
                        .get("sort")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();
    SearchResponse { total, hits }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::TileCoord;
    use crate::types::{FieldType, SortField};

    #[test]
    fn test_search_body() {
        let schema = vec![Field::new("name", FieldType::String)];
        let mut query = SearchQuery::new(20)
            .with_filter("city", "Lyon")
            .with_sort(vec![SortField::desc("date")])
            .with_select(vec!["name".to_string()]);
        query.q = Some("gare".to_string());
        query.after = Some(vec![json!("2024-01-01"), json!("abc")]);

        let body = search_body(&schema, &query);
        assert_eq!(body["size"], 20);
        assert_eq!(body["query"]["bool"]["filter"][0], json!({"term": {"city": "Lyon"}}));
        let text = &body["query"]["bool"]["must"][0]["simple_query_string"];
        assert_eq!(text["query"], "gare");
        assert!(text["fields"].as_array().unwrap().contains(&json!("name.text")));
        assert_eq!(
            body["sort"],
            json!([{"date": {"order": "desc"}}, {"_id": {"order": "asc"}}])
        );
        assert_eq!(body["search_after"], json!(["2024-01-01", "abc"]));
        assert_eq!(body["_source"], json!(["name"]));
    }

    #[test]
    fn test_tile_becomes_bounding_box() {
        let query = SearchQuery::new(0).with_tile(TileCoord::new(0, 0, 1).unwrap());
        let body = count_body(&[], &query);
        let bbox = &body["query"]["bool"]["filter"][0]["geo_bounding_box"]["_geopoint"];
        assert_eq!(bbox["top_left"]["lon"], -180.0);
        assert_eq!(bbox["bottom_right"]["lon"], 0.0);
        assert_eq!(bbox["bottom_right"]["lat"], 0.0);
    }

    #[test]
    fn test_parse_search_response() {
        let body = json!({
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {"_id": "r1", "_source": {"name": "a"}, "sort": [1, "r1"]},
                    {"_id": "r2", "_source": {"name": "b"}, "sort": [2, "r2"]}
                ]
            }
        });
        let response = parse_search_response(&body);
        assert_eq!(response.total, 42);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[1].sort, vec![json!(2), json!("r2")]);
        assert_eq!(response.hits[0].source["name"], "a");
    }
}
