//! Schema of a virtual dataset, derived from its children.

use std::collections::{BTreeMap, HashMap};

use crate::error::{EngineResult, ValidationDetail, ValidationError};
use crate::types::{Capabilities, Field};

fn formatless(field: &Field) -> Option<String> {
    field.effective_format().map(str::to_string)
}

/// Merges capabilities so that a feature is kept only if every child has it.
fn merge_capabilities(target: &mut Capabilities, child: &Capabilities) {
    let opt_out = |target: &mut Option<bool>, child: Option<bool>| {
        if child == Some(false) {
            *target = Some(false);
        }
    };
    opt_out(&mut target.index, child.index);
    opt_out(&mut target.values, child.values);
    opt_out(&mut target.text_standard, child.text_standard);
    opt_out(&mut target.text, child.text);
    opt_out(&mut target.insensitive, child.insensitive);
    opt_out(&mut target.geo_shape, child.geo_shape);
    opt_out(&mut target.geo_corners, child.geo_corners);
    opt_out(&mut target.index_attachment, child.index_attachment);

    // opt-in features need every child to enable them
    let opt_in = |target: &mut Option<bool>, child: Option<bool>| match child {
        Some(true) if target.is_none() => *target = Some(true),
        Some(true) => {}
        _ => *target = Some(false),
    };
    opt_in(&mut target.wildcard, child.wildcard);
    opt_in(&mut target.text_agg, child.text_agg);
}

fn incompatible(key: &str, message: String) -> ValidationError {
    ValidationError::IncompatibleChildren {
        key: key.to_string(),
        details: vec![ValidationDetail::new(key, message)],
    }
}

/// Builds the schema of a virtual dataset as the union of its children.
///
/// Each declared field takes the type, format, concept, separator and
/// display hint of the first child that holds the same key. Every other
/// child must agree on type, format, separator and concept. Declared keys
/// that no child holds are dropped, and so are calculated fields.
pub fn union_schema(declared: &[Field], children: &[Vec<Field>]) -> EngineResult<Vec<Field>> {
    let mut schema = Vec::new();

    for declared_field in declared.iter().filter(|f| !f.calculated) {
        let matching: Vec<&Field> = children
            .iter()
            .flat_map(|child| child.iter().filter(|f| f.key == declared_field.key))
            .collect();
        let Some(reference) = matching.first() else {
            continue;
        };

        let mut field = declared_field.clone();
        field.extension = None;
        field.title = field.title.or_else(|| reference.title.clone());
        field.description = field.description.or_else(|| reference.description.clone());
        field.field_type = reference.field_type;
        field.format = formatless(reference);
        field.refers_to = reference.refers_to.clone();
        field.separator = reference.separator.clone();
        field.display = reference.display.clone();
        field.capabilities = Capabilities::default();

        let mut labels: BTreeMap<String, String> = BTreeMap::new();
        for child_field in &matching {
            if child_field.field_type != field.field_type {
                return Err(incompatible(
                    &field.key,
                    format!("contradictory types ({}, {})", field.field_type, child_field.field_type),
                )
                .into());
            }
            if child_field.separator != field.separator {
                return Err(incompatible(&field.key, "contradictory separators".to_string()).into());
            }
            if formatless(child_field) != field.format {
                return Err(incompatible(&field.key, "contradictory formats".to_string()).into());
            }
            if child_field.refers_to != field.refers_to {
                return Err(incompatible(&field.key, "contradictory concepts".to_string()).into());
            }
            merge_capabilities(&mut field.capabilities, &child_field.capabilities);
            for (value, label) in child_field.labels.iter().flatten() {
                labels.entry(value.clone()).or_insert_with(|| label.clone());
            }
        }
        // opt-in flags disabled everywhere read the same as unset
        for flag in [&mut field.capabilities.wildcard, &mut field.capabilities.text_agg] {
            if *flag == Some(false) {
                *flag = None;
            }
        }
        if !labels.is_empty() {
            field.labels = Some(labels);
        }
        schema.push(field);
    }

    let mut by_concept: HashMap<&str, &str> = HashMap::new();
    for field in &schema {
        let Some(uri) = field.refers_to.as_deref() else {
            continue;
        };
        if let Some(previous) = by_concept.insert(uri, field.key.as_str()) {
            return Err(ValidationError::InvalidPatch {
                message: format!("concept {} is referenced by several fields", uri),
                details: vec![
                    ValidationDetail::new(previous, "same concept"),
                    ValidationDetail::new(field.key.as_str(), "same concept"),
                ],
            }
            .into());
        }
    }

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::types::FieldType;

    #[test]
    fn test_union_takes_first_child_as_reference() {
        let declared = vec![
            Field::new("name", FieldType::String),
            Field::new("gone", FieldType::String),
            Field::calculated("_id", FieldType::String),
        ];
        let children = vec![
            vec![Field::new("name", FieldType::String)
                .with_format("uri-reference")
                .with_title("Name")],
            vec![Field::new("name", FieldType::String)],
        ];
        let schema = union_schema(&declared, &children).unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].key, "name");
        assert_eq!(schema[0].format, None);
        assert_eq!(schema[0].title.as_deref(), Some("Name"));
    }

    #[test]
    fn test_contradictory_types_are_rejected() {
        let declared = vec![Field::new("count", FieldType::Integer)];
        let children = vec![
            vec![Field::new("count", FieldType::Integer)],
            vec![Field::new("count", FieldType::Number)],
        ];
        let err = union_schema(&declared, &children).unwrap_err();
        match err {
            EngineError::Validation(ValidationError::IncompatibleChildren { key, details }) => {
                assert_eq!(key, "count");
                assert_eq!(details.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_capabilities_and_labels_are_merged() {
        let declared = vec![Field::new("code", FieldType::String)];
        let mut first = Field::new("code", FieldType::String).with_capabilities(Capabilities {
            text: Some(false),
            wildcard: Some(true),
            ..Default::default()
        });
        first.labels = Some([("1".to_string(), "one".to_string())].into_iter().collect());
        let mut second = Field::new("code", FieldType::String);
        second.labels = Some(
            [("1".to_string(), "un".to_string()), ("2".to_string(), "two".to_string())]
                .into_iter()
                .collect(),
        );
        let schema = union_schema(&declared, &[vec![first], vec![second]]).unwrap();
        let field = &schema[0];
        assert_eq!(field.capabilities.text, Some(false));
        assert!(!field.capabilities.wildcard());
        let labels = field.labels.as_ref().unwrap();
        assert_eq!(labels["1"], "one");
        assert_eq!(labels["2"], "two");
    }

    #[test]
    fn test_duplicate_concepts_are_rejected() {
        let uri = "http://schema.org/latitude";
        let declared = vec![
            Field::new("a", FieldType::Number),
            Field::new("b", FieldType::Number),
        ];
        let children = vec![vec![
            Field::new("a", FieldType::Number).with_refers_to(uri),
            Field::new("b", FieldType::Number).with_refers_to(uri),
        ]];
        assert!(union_schema(&declared, &children).is_err());
    }
}
