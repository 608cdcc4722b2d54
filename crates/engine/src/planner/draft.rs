//! Draft validation helpers.

use serde_json::Value;

use crate::error::EngineResult;
use crate::schema::geo::document_field;
use crate::schema::{BreakingChangeOptions, breaking_changes_with, structurally_equal};
use crate::types::{Dataset, DatasetPatch, DraftReason};

/// Description keys whose change breaks API consumers.
const BREAKING_DESCRIPTION_KEYS: &[&str] = &[
    "rest",
    "virtual",
    "primaryKey",
    "projection",
    "attachmentsAsImage",
    "extensions",
    "timeZone",
    "slug",
];

/// Returns true if a draft can be validated without a human review.
///
/// Only drafts created by a new file qualify, and only when the new file
/// keeps the published schema exactly: same shape, no added or removed
/// fields, and no document attachment to re-extract.
pub fn can_auto_validate(dataset: &Dataset, draft: &Dataset) -> bool {
    let file_updated = dataset
        .draft_reason
        .as_ref()
        .is_some_and(|r| r.key == DraftReason::file_updated().key);
    if !file_updated {
        return false;
    }
    let strict = BreakingChangeOptions {
        strict: true,
        ..Default::default()
    };
    structurally_equal(&draft.schema, &dataset.schema, true)
        && breaking_changes_with(&dataset.schema, &draft.schema, strict).is_empty()
        && document_field(&draft.schema).is_none()
}

/// Lists the description keys changed by the patch that break API consumers.
///
/// Attributes equal to the current ones are ignored. Toggling the line
/// ownership of a REST dataset is reported as `lineOwnership`.
pub fn breaking_description_keys(
    patch: &DatasetPatch,
    dataset: &Dataset,
) -> EngineResult<Vec<&'static str>> {
    let changed = patch.elide_noops(dataset)?;
    let value = serde_json::to_value(&changed)?;
    let Value::Object(map) = value else {
        return Ok(Vec::new());
    };

    let mut keys: Vec<&'static str> = BREAKING_DESCRIPTION_KEYS
        .iter()
        .copied()
        .filter(|key| map.contains_key(*key))
        .collect();

    let owned_before = dataset.rest.as_ref().is_some_and(|r| r.line_ownership);
    if let Some(rest) = &changed.rest
        && rest.line_ownership != owned_before
    {
        keys.push("lineOwnership");
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, FieldType, RestConfig};

    fn published() -> Dataset {
        let mut dataset = Dataset::new("ds");
        dataset.schema = vec![
            Field::new("name", FieldType::String),
            Field::new("count", FieldType::Integer),
        ];
        dataset.draft_reason = Some(DraftReason::file_updated());
        dataset
    }

    #[test]
    fn test_same_schema_auto_validates() {
        let dataset = published();
        let mut draft = dataset.clone();
        draft.schema.reverse();
        assert!(can_auto_validate(&dataset, &draft));
    }

    #[test]
    fn test_added_field_blocks_auto_validation() {
        let dataset = published();
        let mut draft = dataset.clone();
        draft.schema.push(Field::new("extra", FieldType::Boolean));
        assert!(!can_auto_validate(&dataset, &draft));
    }

    #[test]
    fn test_new_dataset_never_auto_validates() {
        let mut dataset = published();
        dataset.draft_reason = Some(DraftReason::file_new());
        let draft = dataset.clone();
        assert!(!can_auto_validate(&dataset, &draft));
    }

    #[test]
    fn test_breaking_description_keys() {
        let mut dataset = published();
        dataset.is_rest = true;
        dataset.rest = Some(RestConfig::default());
        dataset.slug = Some("stations".to_string());

        let patch = DatasetPatch {
            slug: Some("stations".to_string()),
            title: Some("Stations".to_string()),
            time_zone: Some("Europe/Paris".to_string()),
            rest: Some(RestConfig {
                line_ownership: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let keys = breaking_description_keys(&patch, &dataset).unwrap();
        assert_eq!(keys, vec!["rest", "timeZone", "lineOwnership"]);
    }
}
