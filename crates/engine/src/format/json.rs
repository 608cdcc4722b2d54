//! JSON result pages.

use serde_json::{Map, Value, json};
use url::Url;

use crate::error::{BackendError, EngineResult};
use crate::types::{PageCursor, SearchHit, SearchResponse};

/// Returns the row of a hit as a JSON object carrying its `_id`.
pub fn hit_row(hit: &SearchHit) -> Value {
    let mut row: Map<String, Value> = hit.source.clone();
    row.insert("_id".to_string(), Value::String(hit.id.clone()));
    Value::Object(row)
}

/// Returns the cursor positioned after the last hit when the page is full.
pub fn next_cursor(response: &SearchResponse, size: u64) -> Option<PageCursor> {
    if size == 0 || (response.hits.len() as u64) < size {
        return None;
    }
    let last = response.hits.last()?;
    Some(PageCursor::from_hit_sort(&last.sort, &last.id))
}

/// Builds the link to the next page.
///
/// `params` are the request parameters to carry over; any previous `after`
/// is replaced by the new cursor.
pub fn next_link(
    public_url: &str,
    dataset_id: &str,
    params: &[(String, String)],
    cursor: &PageCursor,
) -> EngineResult<String> {
    let mut url = Url::parse(public_url).map_err(|e| BackendError::Internal {
        backend_name: "formatter".to_string(),
        message: format!("invalid public URL {}: {}", public_url, e),
        source: Some(Box::new(e)),
    })?;
    url.path_segments_mut()
        .map_err(|_| BackendError::Internal {
            backend_name: "formatter".to_string(),
            message: format!("public URL cannot be a base: {}", public_url),
            source: None,
        })?
        .pop_if_empty()
        .extend(["api", "v1", "datasets", dataset_id, "lines"]);
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params.iter().filter(|(k, _)| k != "after") {
            query.append_pair(key, value);
        }
        query.append_pair("after", &cursor.encode());
    }
    Ok(url.into())
}

/// Renders a page as `{total, next?, results}`.
pub fn page(response: &SearchResponse, next: Option<String>) -> Value {
    let mut page = json!({ "total": response.total });
    if let Some(next) = next {
        page["next"] = Value::String(next);
    }
    page["results"] = Value::Array(response.hits.iter().map(hit_row).collect());
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(count: usize) -> SearchResponse {
        SearchResponse {
            total: 10,
            hits: (0..count)
                .map(|i| SearchHit {
                    id: format!("row{}", i),
                    source: json!({"n": i}).as_object().cloned().unwrap(),
                    sort: vec![json!(i), json!(format!("row{}", i))],
                })
                .collect(),
        }
    }

    #[test]
    fn test_next_cursor_only_on_full_pages() {
        assert!(next_cursor(&response(2), 3).is_none());
        let cursor = next_cursor(&response(3), 3).unwrap();
        assert_eq!(cursor.row_id(), "row2");
        assert_eq!(cursor.search_after(), vec![json!(2), json!("row2")]);
    }

    #[test]
    fn test_next_link_replaces_previous_cursor() {
        let cursor = next_cursor(&response(3), 3).unwrap();
        let params = vec![
            ("size".to_string(), "3".to_string()),
            ("after".to_string(), "stale".to_string()),
            ("q".to_string(), "gare nord".to_string()),
        ];
        let link = next_link("https://data.example.org/", "ds", &params, &cursor).unwrap();
        let url = Url::parse(&link).unwrap();
        assert_eq!(url.path(), "/api/v1/datasets/ds/lines");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("size".to_string(), "3".to_string()));
        assert_eq!(pairs[1], ("q".to_string(), "gare nord".to_string()));
        let after = &pairs[2].1;
        assert_eq!(PageCursor::decode(after).unwrap(), cursor);
    }

    #[test]
    fn test_page_shape() {
        let page = page(&response(1), None);
        assert_eq!(page["total"], json!(10));
        assert!(page.get("next").is_none());
        assert_eq!(page["results"][0], json!({"n": 0, "_id": "row0"}));
    }
}
