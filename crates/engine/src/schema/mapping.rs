//! Search index mapping of a schema.
//!
//! Every field maps to one index property. Strings are keywords with
//! analyzed sub-fields switched by capabilities; computed geo fields map to
//! geo types.

use serde_json::{Map, Value, json};

use crate::schema::geo::GEOMETRY_URI;
use crate::types::{Dataset, Field, FieldType};

/// Analyzer of the `text` sub-field.
pub const DEFAULT_ANALYZER: &str = "french";

const LABEL_URI: &str = "http://www.w3.org/2000/01/rdf-schema#label";
const DESCRIPTION_URI: &str = "http://schema.org/description";

/// Returns the index property of a field, or `None` for fields that are
/// not stored in the index.
pub fn field_mapping(field: &Field) -> Option<Value> {
    let capabilities = &field.capabilities;
    let index = capabilities.index();
    let values = capabilities.values();

    match field.key.as_str() {
        "_id" => return None,
        "_geopoint" | "_geocorners" => return Some(json!({"type": "geo_point"})),
        "_geoshape" => {
            return Some(if capabilities.geo_shape() {
                json!({"type": "geo_shape"})
            } else {
                json!({"enabled": false})
            });
        }
        "_i" => return Some(json!({"type": "long"})),
        "_rand" => return Some(json!({"type": "integer"})),
        _ => {}
    }

    // the geometry is copied and simplified into _geoshape
    if field.refers_to.as_deref() == Some(GEOMETRY_URI) {
        return Some(if field.field_type == FieldType::String {
            json!({"type": "keyword", "index": false, "doc_values": false})
        } else {
            json!({"enabled": false})
        });
    }

    let mut inner = Map::new();
    if capabilities.text_standard() {
        inner.insert(
            "text_standard".to_string(),
            json!({"type": "text", "analyzer": "standard"}),
        );
    }

    let mapping = match field.field_type {
        FieldType::Object | FieldType::Array => json!({"type": "object", "enabled": index}),
        FieldType::Integer => {
            json!({"type": "long", "fields": inner, "index": index, "doc_values": values})
        }
        FieldType::Number => {
            json!({"type": "double", "fields": inner, "index": index, "doc_values": values})
        }
        FieldType::Boolean => json!({"type": "boolean", "index": index, "doc_values": values}),
        FieldType::String if field.is_date() => {
            json!({"type": "date", "fields": inner, "index": index, "doc_values": values})
        }
        FieldType::String => {
            let fielddata = capabilities.text_agg();
            if let Some(Value::Object(standard)) = inner.get_mut("text_standard") {
                standard.insert("fielddata".to_string(), Value::Bool(fielddata));
            }
            if capabilities.text() {
                inner.insert(
                    "text".to_string(),
                    json!({"type": "text", "analyzer": DEFAULT_ANALYZER, "fielddata": fielddata}),
                );
            }
            if capabilities.insensitive() {
                inner.insert(
                    "keyword_insensitive".to_string(),
                    json!({"type": "keyword", "ignore_above": 200, "normalizer": "insensitive_normalizer"}),
                );
            }
            if capabilities.wildcard() {
                inner.insert(
                    "wildcard".to_string(),
                    json!({"type": "wildcard", "doc_values": false}),
                );
            }
            json!({
                "type": "keyword",
                "ignore_above": 200,
                "fields": inner,
                "index": index,
                "doc_values": values,
            })
        }
    };
    Some(mapping)
}

/// Returns the mapping document of an index holding rows of `schema`.
///
/// Dotted keys (`_file.content`) become nested object properties.
pub fn index_mapping(schema: &[Field]) -> Value {
    let mut properties = Map::new();
    for field in schema {
        let Some(mapping) = field_mapping(field) else {
            continue;
        };
        insert_nested(&mut properties, &field.key, mapping);
    }
    json!({"dynamic": "strict", "properties": properties})
}

fn insert_nested(properties: &mut Map<String, Value>, key: &str, mapping: Value) {
    match key.split_once('.') {
        None => {
            properties.insert(key.to_string(), mapping);
        }
        Some((head, rest)) => {
            let entry = properties
                .entry(head.to_string())
                .or_insert_with(|| json!({"type": "object", "properties": {}}));
            if let Some(Value::Object(children)) = entry.get_mut("properties") {
                insert_nested(children, rest, mapping);
            }
        }
    }
}

/// Lists the keys whose mapped type differs between two schemas.
///
/// An index can absorb new fields in place, but never a type change on an
/// existing one.
pub fn mapping_conflicts(old: &[Field], new: &[Field]) -> Vec<String> {
    let mapped_type = |field: &Field| {
        field_mapping(field).map(|m| {
            m.get("type")
                .and_then(Value::as_str)
                .unwrap_or("object")
                .to_string()
        })
    };
    new.iter()
        .filter_map(|field| {
            let previous = old.iter().find(|f| f.key == field.key)?;
            (mapped_type(previous) != mapped_type(field)).then(|| field.key.clone())
        })
        .collect()
}

/// Returns the index fields a full-text query searches, with boosts.
pub fn search_fields(schema: &[Field]) -> Vec<String> {
    let mut fields = Vec::new();
    for field in schema {
        let Some(mapping) = field_mapping(field) else {
            continue;
        };
        let indexed = mapping.get("index") != Some(&Value::Bool(false))
            && mapping.get("enabled") != Some(&Value::Bool(false));
        if indexed && mapping.get("type").and_then(Value::as_str) == Some("keyword") {
            fields.push(field.key.clone());
        }
        let boost = match field.refers_to.as_deref() {
            Some(LABEL_URI) => "^3",
            Some(DESCRIPTION_URI) => "^2",
            _ => "",
        };
        let inner = mapping.get("fields").and_then(Value::as_object);
        for sub in ["text", "text_standard"] {
            if inner.is_some_and(|f| f.contains_key(sub)) {
                fields.push(format!("{}.{}{}", field.key, sub, boost));
            }
        }
    }
    fields
}

/// Returns the index alias of a dataset.
pub fn alias_name(prefix: &str, dataset_id: &str, draft: bool) -> String {
    if draft {
        format!("{}_draft-{}", prefix, dataset_id)
    } else {
        format!("{}-{}", prefix, dataset_id)
    }
}

/// Returns the aliases a search on `dataset` runs against.
///
/// A virtual dataset is searched through its children, a dataset with a
/// pending draft through its draft index.
pub fn search_targets(prefix: &str, dataset: &Dataset) -> Vec<String> {
    if dataset.is_virtual {
        return dataset
            .virtual_config
            .iter()
            .flat_map(|v| v.children.iter())
            .map(|child| alias_name(prefix, child, false))
            .collect();
    }
    vec![alias_name(prefix, &dataset.id, dataset.draft_reason.is_some())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Capabilities;

    #[test]
    fn test_string_mapping_follows_capabilities() {
        let mapping = field_mapping(&Field::new("name", FieldType::String)).unwrap();
        assert_eq!(mapping["type"], "keyword");
        let inner = mapping["fields"].as_object().unwrap();
        assert!(inner.contains_key("text"));
        assert!(inner.contains_key("text_standard"));
        assert!(inner.contains_key("keyword_insensitive"));
        assert!(!inner.contains_key("wildcard"));

        let restricted = Field::new("code", FieldType::String).with_capabilities(Capabilities {
            text: Some(false),
            insensitive: Some(false),
            wildcard: Some(true),
            index: Some(false),
            ..Default::default()
        });
        let mapping = field_mapping(&restricted).unwrap();
        let inner = mapping["fields"].as_object().unwrap();
        assert!(!inner.contains_key("text"));
        assert!(inner.contains_key("wildcard"));
        assert_eq!(mapping["index"], false);
    }

    #[test]
    fn test_typed_mappings() {
        let date = Field::new("d", FieldType::String).with_format("date");
        assert_eq!(field_mapping(&date).unwrap()["type"], "date");
        assert_eq!(
            field_mapping(&Field::new("n", FieldType::Number)).unwrap()["type"],
            "double"
        );
        assert_eq!(
            field_mapping(&Field::new("i", FieldType::Integer)).unwrap()["type"],
            "long"
        );
        assert!(field_mapping(&Field::calculated("_id", FieldType::String)).is_none());
        assert_eq!(
            field_mapping(&Field::calculated("_rand", FieldType::Integer)).unwrap(),
            json!({"type": "integer"})
        );
    }

    #[test]
    fn test_geometry_is_not_indexed() {
        let geometry = Field::new("geom", FieldType::String).with_refers_to(GEOMETRY_URI);
        assert_eq!(field_mapping(&geometry).unwrap()["index"], false);

        let shape = Field::calculated("_geoshape", FieldType::Object).with_capabilities(Capabilities {
            geo_shape: Some(false),
            ..Default::default()
        });
        assert_eq!(field_mapping(&shape).unwrap(), json!({"enabled": false}));
    }

    #[test]
    fn test_index_mapping_nests_dotted_keys() {
        let schema = vec![
            Field::calculated("_file.content", FieldType::String),
            Field::calculated("_file.content_length", FieldType::Integer),
            Field::calculated("_id", FieldType::String),
        ];
        let mapping = index_mapping(&schema);
        let file = &mapping["properties"]["_file"]["properties"];
        assert_eq!(file["content"]["type"], "keyword");
        assert_eq!(file["content_length"]["type"], "long");
        assert!(mapping["properties"].get("_id").is_none());
    }

    #[test]
    fn test_mapping_conflicts() {
        let old = vec![
            Field::new("a", FieldType::String),
            Field::new("b", FieldType::Integer),
        ];
        let new = vec![
            Field::new("a", FieldType::Integer),
            Field::new("b", FieldType::Integer),
            Field::new("c", FieldType::Boolean),
        ];
        assert_eq!(mapping_conflicts(&old, &new), vec!["a".to_string()]);
    }

    #[test]
    fn test_search_fields_boost_labels() {
        let schema = vec![
            Field::new("title", FieldType::String).with_refers_to(LABEL_URI),
            Field::new("count", FieldType::Integer),
        ];
        let fields = search_fields(&schema);
        assert!(fields.contains(&"title".to_string()));
        assert!(fields.contains(&"title.text^3".to_string()));
        assert!(fields.contains(&"count.text_standard".to_string()));
    }

    #[test]
    fn test_alias_name() {
        assert_eq!(alias_name("dataset", "abc", false), "dataset-abc");
        assert_eq!(alias_name("dataset", "abc", true), "dataset_draft-abc");
    }

    #[test]
    fn test_virtual_datasets_search_their_children() {
        let mut dataset = Dataset::new("all");
        dataset.is_virtual = true;
        dataset.virtual_config = Some(crate::types::VirtualConfig {
            children: vec!["a".to_string(), "b".to_string()],
            filters: Vec::new(),
        });
        assert_eq!(
            search_targets("dataset", &dataset),
            vec!["dataset-a".to_string(), "dataset-b".to_string()]
        );
        assert_eq!(search_targets("dataset", &Dataset::new("x")), vec!["dataset-x".to_string()]);
    }
}
