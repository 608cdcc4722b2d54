//! Well-known text rendering of GeoJSON geometries.

use serde_json::Value;

/// Returns the WKT form of a GeoJSON geometry, or `None` for unsupported or
/// malformed geometries.
pub fn geometry_to_wkt(geometry: &Value) -> Option<String> {
    let kind = geometry.get("type")?.as_str()?;
    if kind == "GeometryCollection" {
        let parts: Vec<String> = geometry
            .get("geometries")?
            .as_array()?
            .iter()
            .filter_map(geometry_to_wkt)
            .collect();
        return Some(collection(&parts));
    }

    let coordinates = geometry.get("coordinates")?;
    let body = match kind {
        "Point" => position(coordinates)?,
        "MultiPoint" | "LineString" => positions(coordinates)?,
        "MultiLineString" | "Polygon" => rings(coordinates)?,
        "MultiPolygon" => {
            let polygons: Option<Vec<String>> = coordinates
                .as_array()?
                .iter()
                .map(|polygon| rings(polygon).map(|r| format!("({})", r)))
                .collect();
            polygons?.join(", ")
        }
        _ => return None,
    };
    Some(format!("{} ({})", kind.to_uppercase(), body))
}

/// Renders every feature geometry of a FeatureCollection as one collection.
pub fn collection_to_wkt(feature_collection: &Value) -> String {
    let parts: Vec<String> = feature_collection
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .filter_map(|feature| feature.get("geometry"))
        .filter_map(geometry_to_wkt)
        .collect();
    collection(&parts)
}

fn collection(parts: &[String]) -> String {
    if parts.is_empty() {
        "GEOMETRYCOLLECTION EMPTY".to_string()
    } else {
        format!("GEOMETRYCOLLECTION ({})", parts.join(", "))
    }
}

fn position(value: &Value) -> Option<String> {
    let items = value.as_array()?;
    let x = items.first()?.as_f64()?;
    let y = items.get(1)?.as_f64()?;
    Some(format!("{} {}", x, y))
}

fn positions(value: &Value) -> Option<String> {
    let items: Option<Vec<String>> = value.as_array()?.iter().map(position).collect();
    Some(items?.join(", "))
}

fn rings(value: &Value) -> Option<String> {
    let items: Option<Vec<String>> = value
        .as_array()?
        .iter()
        .map(|ring| positions(ring).map(|p| format!("({})", p)))
        .collect();
    Some(items?.join(", "))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_point_and_polygon() {
        assert_eq!(
            geometry_to_wkt(&json!({"type": "Point", "coordinates": [4.83, 45.75]})).unwrap(),
            "POINT (4.83 45.75)"
        );
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]
        });
        assert_eq!(
            geometry_to_wkt(&polygon).unwrap(),
            "POLYGON ((0 0, 1 0, 1 1, 0 0))"
        );
    }

    #[test]
    fn test_multipolygon() {
        let geometry = json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0, 0], [1, 0], [1, 1], [0, 0]]],
                [[[2, 2], [3, 2], [3, 3], [2, 2]]]
            ]
        });
        assert_eq!(
            geometry_to_wkt(&geometry).unwrap(),
            "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 0)), ((2 2, 3 2, 3 3, 2 2)))"
        );
    }

    #[test]
    fn test_collection_skips_missing_geometries() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.5, 2]}},
                {"type": "Feature", "geometry": null}
            ]
        });
        assert_eq!(collection_to_wkt(&collection), "GEOMETRYCOLLECTION (POINT (1.5 2))");
        assert_eq!(
            collection_to_wkt(&json!({"features": []})),
            "GEOMETRYCOLLECTION EMPTY"
        );
    }
}
