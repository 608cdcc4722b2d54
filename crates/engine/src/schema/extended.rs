//! Extended schema: the declared fields plus every field the platform computes.

use crate::schema::geo::{self, IMAGE_URI, LAT_LON_URI};
use crate::schema::vocabulary::Vocabulary;
use crate::types::{Capabilities, Dataset, Field, FieldType};

fn system(key: &str, field_type: FieldType, title: &str, description: Option<&str>) -> Field {
    let mut field = Field::calculated(key, field_type).with_title(title);
    field.description = description.map(str::to_string);
    field
}

fn untokenized() -> Capabilities {
    Capabilities {
        insensitive: Some(false),
        text: Some(false),
        text_standard: Some(false),
        ..Default::default()
    }
}

fn no_text() -> Capabilities {
    Capabilities {
        text: Some(false),
        ..Default::default()
    }
}

/// Builds the extended schema of a dataset.
///
/// Declared fields that are extension-owned or not calculated are kept, in
/// order. Computed fields follow: attachments, geography, REST bookkeeping,
/// then `_id`, `_i` and `_rand`. Concepts are then reconciled against
/// `standard` first and `owner` on a miss.
pub fn extended_schema(dataset: &Dataset, standard: &Vocabulary, owner: Option<&Vocabulary>) -> Vec<Field> {
    let declared = &dataset.schema;
    let mut schema: Vec<Field> = declared
        .iter()
        .filter(|f| !f.is_system())
        .cloned()
        .collect();

    if let Some(document) = geo::document_field(declared) {
        if document.capabilities.index_attachment() {
            schema.push(system(
                "_file.content",
                FieldType::String,
                "Text content of the file",
                Some("Result of an automatic extraction"),
            ));
            schema.push(system(
                "_file.content_type",
                FieldType::String,
                "Mime type of the file",
                Some("Result of an automatic detection"),
            ));
            schema.push(system(
                "_file.content_length",
                FieldType::Integer,
                "Size of the file in bytes",
                Some("Result of an automatic detection"),
            ));
        }
        if dataset.attachments_as_image == Some(true) {
            schema.push(
                system("_attachment_url", FieldType::String, "Download URL of the attached image", None)
                    .with_refers_to(IMAGE_URI),
            );
        } else {
            schema.push(system(
                "_attachment_url",
                FieldType::String,
                "Download URL of the attached file",
                None,
            ));
        }
    }

    if geo::has_geo(declared) {
        let geometry = geo::geometry_field(declared);
        if let Some(geometry) = geometry {
            let shape = system(
                "_geoshape",
                FieldType::Object,
                "Geometry",
                Some("A GeoJSON geometry"),
            );
            schema.push(shape.with_capabilities(geometry.capabilities));
            if geometry.capabilities.geo_corners() {
                schema.push(system(
                    "_geocorners",
                    FieldType::Array,
                    "Bounding box of the geometry",
                    Some("Array of \"lat,lon\" coordinates"),
                ));
            }
        }
        let mut geopoint = system(
            "_geopoint",
            FieldType::String,
            "Geographic coordinates",
            Some("Centroid as \"lat,lon\""),
        );
        if !schema.iter().any(|f| f.refers_to.as_deref() == Some(LAT_LON_URI)) {
            geopoint.refers_to = Some(LAT_LON_URI.to_string());
        }
        schema.push(geopoint);
    }

    if dataset.is_rest {
        schema.push(
            system(
                "_updatedAt",
                FieldType::String,
                "Update date",
                Some("Date of the last update of the row"),
            )
            .with_format("date-time"),
        );
        let rest = dataset.rest.clone().unwrap_or_default();
        if rest.store_updated_by {
            schema.push(
                system("_updatedBy", FieldType::String, "Updated by", None)
                    .with_capabilities(untokenized()),
            );
            schema.push(
                system("_updatedByName", FieldType::String, "Name of the updater", None)
                    .with_capabilities(no_text()),
            );
        }
        if rest.line_ownership {
            if !schema.iter().any(|f| f.key == "_owner") {
                schema.push(
                    Field::new("_owner", FieldType::String)
                        .with_title("Row owner")
                        .with_capabilities(untokenized()),
                );
            }
            if !schema.iter().any(|f| f.key == "_ownerName") {
                schema.push(
                    Field::new("_ownerName", FieldType::String)
                        .with_title("Name of the row owner")
                        .with_capabilities(no_text()),
                );
            }
        }
    }

    schema.push(
        system(
            "_id",
            FieldType::String,
            "Identifier",
            Some("Unique identifier among all the rows of the dataset"),
        )
        .with_format("uri-reference"),
    );
    schema.push(system(
        "_i",
        FieldType::Integer,
        "Row number",
        Some("Index of the row in the source file"),
    ));
    schema.push(system(
        "_rand",
        FieldType::Integer,
        "Random number",
        Some("A random number attached to the row, used for random sorting"),
    ));

    reconcile_concepts(&mut schema, standard, owner);
    schema
}

/// Rewrites the concept annotation of every field from its `x-refersTo`.
pub fn reconcile_concepts(schema: &mut [Field], standard: &Vocabulary, owner: Option<&Vocabulary>) {
    for field in schema.iter_mut() {
        field.concept = field.refers_to.as_deref().and_then(|uri| {
            standard
                .lookup(uri)
                .or_else(|| owner.and_then(|o| o.lookup(uri)))
                .map(|c| c.to_ref())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::geo::{DOCUMENT_URI, GEOMETRY_URI, LAT_URIS, LON_URIS};
    use crate::schema::vocabulary::Concept;
    use crate::types::{ConceptRef, RestConfig};

    fn keys(schema: &[Field]) -> Vec<&str> {
        schema.iter().map(|f| f.key.as_str()).collect()
    }

    #[test]
    fn test_plain_dataset_gets_row_fields() {
        let mut dataset = Dataset::new("ds");
        dataset.schema = vec![
            Field::new("a", FieldType::String),
            Field::calculated("_i", FieldType::Integer),
        ];
        let schema = extended_schema(&dataset, Vocabulary::standard(), None);
        assert_eq!(keys(&schema), vec!["a", "_id", "_i", "_rand"]);
        assert_eq!(schema[1].format.as_deref(), Some("uri-reference"));
    }

    #[test]
    fn test_attachments_and_geometry_order() {
        let mut dataset = Dataset::new("ds");
        dataset.attachments_as_image = Some(true);
        dataset.schema = vec![
            Field::new("doc", FieldType::String).with_refers_to(DOCUMENT_URI),
            Field::new("geom", FieldType::String).with_refers_to(GEOMETRY_URI),
        ];
        let schema = extended_schema(&dataset, Vocabulary::standard(), None);
        assert_eq!(
            keys(&schema),
            vec![
                "doc",
                "geom",
                "_file.content",
                "_file.content_type",
                "_file.content_length",
                "_attachment_url",
                "_geoshape",
                "_geocorners",
                "_geopoint",
                "_id",
                "_i",
                "_rand",
            ]
        );
        let url = schema.iter().find(|f| f.key == "_attachment_url").unwrap();
        assert_eq!(url.refers_to.as_deref(), Some(IMAGE_URI));
        let geopoint = schema.iter().find(|f| f.key == "_geopoint").unwrap();
        assert_eq!(geopoint.refers_to.as_deref(), Some(LAT_LON_URI));
        assert_eq!(geopoint.concept.as_ref().unwrap().id, "latLon");
    }

    #[test]
    fn test_disabled_attachment_index_and_corners() {
        let mut dataset = Dataset::new("ds");
        dataset.schema = vec![
            Field::new("doc", FieldType::String)
                .with_refers_to(DOCUMENT_URI)
                .with_capabilities(Capabilities {
                    index_attachment: Some(false),
                    ..Default::default()
                }),
            Field::new("geom", FieldType::String)
                .with_refers_to(GEOMETRY_URI)
                .with_capabilities(Capabilities {
                    geo_corners: Some(false),
                    ..Default::default()
                }),
        ];
        let schema = extended_schema(&dataset, Vocabulary::standard(), None);
        let keys = keys(&schema);
        assert!(!keys.contains(&"_file.content"));
        assert!(!keys.contains(&"_geocorners"));
        let shape = schema.iter().find(|f| f.key == "_geoshape").unwrap();
        assert_eq!(shape.capabilities.geo_corners, Some(false));
    }

    #[test]
    fn test_lat_lon_fields_produce_geopoint_only() {
        let mut dataset = Dataset::new("ds");
        dataset.schema = vec![
            Field::new("lat", FieldType::Number).with_refers_to(LAT_URIS[0]),
            Field::new("lon", FieldType::Number).with_refers_to(LON_URIS[0]),
        ];
        let schema = extended_schema(&dataset, Vocabulary::standard(), None);
        assert_eq!(keys(&schema), vec!["lat", "lon", "_geopoint", "_id", "_i", "_rand"]);
    }

    #[test]
    fn test_rest_bookkeeping_fields() {
        let mut dataset = Dataset::new("ds");
        dataset.is_rest = true;
        dataset.rest = Some(RestConfig {
            store_updated_by: true,
            line_ownership: true,
            ..Default::default()
        });
        dataset.schema = vec![Field::new("_owner", FieldType::String)];
        let schema = extended_schema(&dataset, Vocabulary::standard(), None);
        assert_eq!(
            keys(&schema),
            vec![
                "_owner",
                "_updatedAt",
                "_updatedBy",
                "_updatedByName",
                "_ownerName",
                "_id",
                "_i",
                "_rand",
            ]
        );
    }

    #[test]
    fn test_concepts_are_reconciled() {
        let owner = Vocabulary::new(vec![Concept {
            id: "station".to_string(),
            title: "Station".to_string(),
            identifiers: vec!["https://example.com/station".to_string()],
            description: None,
            concept_type: None,
            format: None,
            tag: None,
        }]);
        let stale = ConceptRef {
            id: "old".to_string(),
            title: "Old".to_string(),
            primary: true,
        };
        let mut dataset = Dataset::new("ds");
        let mut plain = Field::new("plain", FieldType::String);
        plain.concept = Some(stale.clone());
        let mut unknown = Field::new("unknown", FieldType::String).with_refers_to("https://example.com/nothing");
        unknown.concept = Some(stale);
        dataset.schema = vec![
            Field::new("label", FieldType::String).with_refers_to("http://www.w3.org/2000/01/rdf-schema#label"),
            Field::new("station", FieldType::String).with_refers_to("https://example.com/station"),
            plain,
            unknown,
        ];
        let schema = extended_schema(&dataset, Vocabulary::standard(), Some(&owner));
        assert_eq!(schema[0].concept.as_ref().unwrap().id, "label");
        assert_eq!(schema[1].concept.as_ref().unwrap().id, "station");
        assert!(schema[2].concept.is_none());
        assert!(schema[3].concept.is_none());
    }

    #[test]
    fn test_deterministic() {
        let mut dataset = Dataset::new("ds");
        dataset.schema = vec![
            Field::new("geom", FieldType::String).with_refers_to(GEOMETRY_URI),
            Field::new("b", FieldType::Boolean),
        ];
        let first = extended_schema(&dataset, Vocabulary::standard(), None);
        let second = extended_schema(&dataset, Vocabulary::standard(), None);
        assert_eq!(first, second);
    }
}
