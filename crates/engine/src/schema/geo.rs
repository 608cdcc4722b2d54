//! Geographic concepts and the fields that carry them.

use crate::types::Field;

/// A GeoJSON or WKT geometry.
pub const GEOMETRY_URI: &str = "https://purl.org/geojson/vocab#geometry";
/// A geometry in the dataset projection.
pub const PROJECTED_GEOMETRY_URI: &str = "http://data.ign.fr/def/geometrie#Geometry";
/// A `"lat,lon"` pair.
pub const LAT_LON_URI: &str = "http://www.w3.org/2003/01/geo/wgs84_pos#lat_long";
/// Latitude concepts.
pub const LAT_URIS: [&str; 2] = [
    "http://schema.org/latitude",
    "http://www.w3.org/2003/01/geo/wgs84_pos#lat",
];
/// Longitude concepts.
pub const LON_URIS: [&str; 2] = [
    "http://schema.org/longitude",
    "http://www.w3.org/2003/01/geo/wgs84_pos#long",
];
/// Projected easting.
pub const COORD_X_URI: &str = "http://data.ign.fr/def/geometrie#coordX";
/// Projected northing.
pub const COORD_Y_URI: &str = "http://data.ign.fr/def/geometrie#coordY";
/// A file attached to a row.
pub const DOCUMENT_URI: &str = "http://schema.org/DigitalDocument";
/// An image URL.
pub const IMAGE_URI: &str = "http://schema.org/image";

fn refers_to(field: &Field, uri: &str) -> bool {
    field.refers_to.as_deref() == Some(uri)
}

fn find<'a>(schema: &'a [Field], uri: &str) -> Option<&'a Field> {
    schema.iter().find(|f| refers_to(f, uri))
}

fn find_any<'a>(schema: &'a [Field], uris: &[&str]) -> Option<&'a Field> {
    schema
        .iter()
        .find(|f| f.refers_to.as_deref().is_some_and(|r| uris.contains(&r)))
}

/// Returns the field holding the geometry, WGS 84 first.
pub fn geometry_field(schema: &[Field]) -> Option<&Field> {
    find(schema, GEOMETRY_URI).or_else(|| find(schema, PROJECTED_GEOMETRY_URI))
}

/// Returns the fields a point is computed from.
///
/// Latitude and longitude win over projected coordinates, which win over a
/// declared `"lat,lon"` field.
pub fn geopoint_fields(schema: &[Field]) -> Option<Vec<&Field>> {
    if let (Some(lat), Some(lon)) = (find_any(schema, &LAT_URIS), find_any(schema, &LON_URIS)) {
        return Some(vec![lat, lon]);
    }
    if let (Some(x), Some(y)) = (find(schema, COORD_X_URI), find(schema, COORD_Y_URI)) {
        return Some(vec![x, y]);
    }
    schema
        .iter()
        .find(|f| !f.calculated && refers_to(f, LAT_LON_URI))
        .map(|f| vec![f])
}

/// Returns true if a geometry or a point can be computed.
pub fn has_geo(schema: &[Field]) -> bool {
    geometry_field(schema).is_some() || geopoint_fields(schema).is_some()
}

/// Returns true if the schema holds coordinates that need the dataset projection.
pub fn has_projected_coordinates(schema: &[Field]) -> bool {
    let coords = find(schema, COORD_X_URI).is_some() && find(schema, COORD_Y_URI).is_some();
    coords || find(schema, PROJECTED_GEOMETRY_URI).is_some()
}

/// Returns the field holding attached documents.
pub fn document_field(schema: &[Field]) -> Option<&Field> {
    find(schema, DOCUMENT_URI)
}

/// Summarizes which fields carry geography, as `geometry/geopoint`.
///
/// Two schemas with the same key compute the same geo fields.
pub fn geo_fields_key(schema: &[Field]) -> String {
    let geometry = geometry_field(schema)
        .map(|f| f.key.clone())
        .unwrap_or_else(|| "false".to_string());
    let geopoint = geopoint_fields(schema)
        .map(|fields| {
            fields
                .iter()
                .map(|f| f.key.as_str())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_else(|| "false".to_string());
    format!("{}/{}", geometry, geopoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldType;

    #[test]
    fn test_geo_fields_key() {
        let schema = vec![
            Field::new("lat", FieldType::Number).with_refers_to(LAT_URIS[0]),
            Field::new("lon", FieldType::Number).with_refers_to(LON_URIS[1]),
        ];
        assert_eq!(geo_fields_key(&schema), "false/lat/lon");

        let schema = vec![Field::new("geom", FieldType::String).with_refers_to(GEOMETRY_URI)];
        assert_eq!(geo_fields_key(&schema), "geom/false");
        assert_eq!(geo_fields_key(&[]), "false/false");
    }

    #[test]
    fn test_calculated_lat_lon_is_not_a_source() {
        let schema = vec![Field::calculated("_geopoint", FieldType::String).with_refers_to(LAT_LON_URI)];
        assert!(geopoint_fields(&schema).is_none());

        let schema = vec![Field::new("position", FieldType::String).with_refers_to(LAT_LON_URI)];
        assert_eq!(geopoint_fields(&schema).unwrap()[0].key, "position");
    }

    #[test]
    fn test_projected_coordinates() {
        let coords = vec![
            Field::new("x", FieldType::Number).with_refers_to(COORD_X_URI),
            Field::new("y", FieldType::Number).with_refers_to(COORD_Y_URI),
        ];
        assert!(has_projected_coordinates(&coords));
        assert!(!has_projected_coordinates(&coords[..1]));

        let geom = vec![Field::new("g", FieldType::String).with_refers_to(PROJECTED_GEOMETRY_URI)];
        assert!(has_projected_coordinates(&geom));
        assert_eq!(geometry_field(&geom).unwrap().key, "g");
    }
}
