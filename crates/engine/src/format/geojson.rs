//! GeoJSON rendering of search hits.

use serde_json::{Map, Value, json};

use crate::types::{SearchHit, SearchResponse};

/// Returns the geometry of a row: its shape, or a point built from the
/// `"lat,lon"` geopoint.
pub fn hit_geometry(source: &Map<String, Value>) -> Option<Value> {
    if let Some(shape) = source.get("_geoshape").filter(|v| !v.is_null()) {
        return Some(shape.clone());
    }
    let (lat, lon) = source.get("_geopoint")?.as_str()?.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    Some(json!({"type": "Point", "coordinates": [lon, lat]}))
}

/// Builds the feature of one hit. Nested properties are flattened with dot
/// keys, arrays are kept as they are.
pub fn hit_feature(hit: &SearchHit) -> Value {
    let geometry = hit_geometry(&hit.source);
    let mut properties = Map::new();
    for (key, value) in &hit.source {
        if key == "_geoshape" || (key == "_geopoint" && geometry.is_some()) {
            continue;
        }
        flatten_into(&mut properties, key, value);
    }
    properties.insert("_id".to_string(), Value::String(hit.id.clone()));

    json!({
        "type": "Feature",
        "id": hit.id,
        "geometry": geometry.unwrap_or(Value::Null),
        "properties": properties,
    })
}

fn flatten_into(out: &mut Map<String, Value>, prefix: &str, value: &Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(out, &format!("{}.{}", prefix, key), nested);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Builds a FeatureCollection with the total match count and the bounding
/// box of every geometry.
pub fn feature_collection(response: &SearchResponse) -> Value {
    let features: Vec<Value> = response.hits.iter().map(hit_feature).collect();
    let mut collection = json!({
        "type": "FeatureCollection",
        "total": response.total,
    });
    if let Some(bbox) = collection_bbox(&features) {
        collection["bbox"] = json!(bbox);
    }
    collection["features"] = Value::Array(features);
    collection
}

/// Returns `[west, south, east, north]` over every coordinate of the features.
pub fn collection_bbox(features: &[Value]) -> Option<[f64; 4]> {
    let mut bbox: Option<[f64; 4]> = None;
    for feature in features {
        if let Some(geometry) = feature.get("geometry") {
            extend_bbox(&mut bbox, geometry);
        }
    }
    bbox
}

fn extend_bbox(bbox: &mut Option<[f64; 4]>, geometry: &Value) {
    if let Some(geometries) = geometry.get("geometries").and_then(Value::as_array) {
        for geometry in geometries {
            extend_bbox(bbox, geometry);
        }
        return;
    }
    if let Some(coordinates) = geometry.get("coordinates") {
        visit_positions(coordinates, &mut |lon, lat| {
            let b = bbox.get_or_insert([lon, lat, lon, lat]);
            b[0] = b[0].min(lon);
            b[1] = b[1].min(lat);
            b[2] = b[2].max(lon);
            b[3] = b[3].max(lat);
        });
    }
}

/// Calls `f` with every `[lon, lat]` position of a coordinates array.
pub(crate) fn visit_positions(coordinates: &Value, f: &mut impl FnMut(f64, f64)) {
    let Some(items) = coordinates.as_array() else {
        return;
    };
    match (items.first().and_then(Value::as_f64), items.get(1).and_then(Value::as_f64)) {
        (Some(lon), Some(lat)) => f(lon, lat),
        _ => {
            for item in items {
                visit_positions(item, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, source: Value) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            source: source.as_object().cloned().unwrap_or_default(),
            sort: Vec::new(),
        }
    }

    #[test]
    fn test_point_from_geopoint() {
        let feature = hit_feature(&hit(
            "1",
            json!({"name": "Bellecour", "_geopoint": "45.75,4.83", "address": {"city": "Lyon"}}),
        ));
        assert_eq!(feature["id"], json!("1"));
        assert_eq!(feature["geometry"]["coordinates"], json!([4.83, 45.75]));
        assert_eq!(feature["properties"]["address.city"], json!("Lyon"));
        assert_eq!(feature["properties"]["_id"], json!("1"));
        assert!(feature["properties"].get("_geopoint").is_none());
    }

    #[test]
    fn test_shape_wins_over_point() {
        let feature = hit_feature(&hit(
            "2",
            json!({
                "_geopoint": "45.75,4.83",
                "_geoshape": {"type": "LineString", "coordinates": [[4.8, 45.7], [4.9, 45.8]]}
            }),
        ));
        assert_eq!(feature["geometry"]["type"], json!("LineString"));
        assert_eq!(feature["properties"]["_geopoint"], json!("45.75,4.83"));
    }

    #[test]
    fn test_collection_bbox() {
        let response = SearchResponse {
            total: 3,
            hits: vec![
                hit("1", json!({"_geopoint": "45.75,4.83"})),
                hit("2", json!({"_geopoint": "48.85,2.35"})),
                hit("3", json!({"name": "nowhere"})),
            ],
        };
        let collection = feature_collection(&response);
        assert_eq!(collection["total"], json!(3));
        assert_eq!(collection["bbox"], json!([2.35, 45.75, 4.83, 48.85]));
        assert_eq!(collection["features"].as_array().unwrap().len(), 3);
        assert!(collection["features"][2]["geometry"].is_null());
    }
}
