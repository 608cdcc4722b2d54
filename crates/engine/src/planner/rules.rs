//! The ordered decision table of the planner.
//!
//! Rules are evaluated in order against the normalized patch; the first one
//! whose predicate holds applies its effect and the others are skipped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::planner::PlanContext;
use crate::schema::geo::{geo_fields_key, has_projected_coordinates};
use crate::schema::{
    extended_schema, has_validation_rules, structurally_equal, union_schema, validation_compatible,
};
use crate::types::{Dataset, DatasetPatch, DatasetStatus, DraftReason, Field};

/// Identifier of a planning rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    FileUpdated,
    RemoteFile,
    VirtualSchema,
    DetectionHints,
    Extensions,
    Projection,
    GeoFields,
    ParsingHints,
    RestRemovedFields,
    TransformChange,
    ValidationRules,
    SchemaShape,
    FinalizeOnly,
    RestHistory,
    RestConfig,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::FileUpdated => "file-updated",
            RuleId::RemoteFile => "remote-file",
            RuleId::VirtualSchema => "virtual-schema",
            RuleId::DetectionHints => "detection-hints",
            RuleId::Extensions => "extensions",
            RuleId::Projection => "projection",
            RuleId::GeoFields => "geo-fields",
            RuleId::ParsingHints => "parsing-hints",
            RuleId::RestRemovedFields => "rest-removed-fields",
            RuleId::TransformChange => "transform-change",
            RuleId::ValidationRules => "validation-rules",
            RuleId::SchemaShape => "schema-shape",
            RuleId::FinalizeOnly => "finalize-only",
            RuleId::RestHistory => "rest-history",
            RuleId::RestConfig => "rest-config",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the rules read.
pub(crate) struct RuleInput<'a> {
    pub dataset: &'a Dataset,
    pub ctx: &'a PlanContext<'a>,
}

/// The plan under construction.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlanDraft {
    pub patch: DatasetPatch,
    pub status: Option<DatasetStatus>,
    pub draft_reason: Option<DraftReason>,
    pub data_updated: bool,
    pub finalized: bool,
    pub attempt_mapping_update: bool,
    pub removed_rest_props: Vec<String>,
}

impl PlanDraft {
    pub fn new(patch: DatasetPatch) -> Self {
        Self {
            patch,
            ..Default::default()
        }
    }

    fn schema(&self) -> Option<&[Field]> {
        self.patch.schema.as_deref()
    }
}

pub(crate) struct Rule {
    pub id: RuleId,
    pub applies: fn(&RuleInput<'_>, &PlanDraft) -> bool,
    pub apply: fn(&RuleInput<'_>, &mut PlanDraft) -> EngineResult<()>,
}

pub(crate) static RULES: &[Rule] = &[
    Rule {
        id: RuleId::FileUpdated,
        applies: |_, draft| !draft.patch.uploads.is_empty(),
        apply: file_updated,
    },
    Rule {
        id: RuleId::RemoteFile,
        applies: |_, draft| draft.patch.remote_file.is_some(),
        apply: remote_file,
    },
    Rule {
        id: RuleId::VirtualSchema,
        applies: |input, draft| {
            input.dataset.is_virtual
                && (draft.patch.schema.is_some() || draft.patch.virtual_config.is_some())
        },
        apply: virtual_schema,
    },
    Rule {
        id: RuleId::DetectionHints,
        applies: |input, draft| {
            changed_on_any_field(input.dataset, draft, |old, new| {
                old.ignore_detection != new.ignore_detection
                    || old.ignore_integer_detection != new.ignore_integer_detection
            })
        },
        apply: |_, draft| {
            draft.status = Some(DatasetStatus::Loaded);
            Ok(())
        },
    },
    Rule {
        id: RuleId::Extensions,
        applies: |input, draft| draft.patch.extensions.is_some() && !input.dataset.is_rest,
        apply: |input, draft| {
            draft.status = Some(input.dataset.reindexer_status());
            for extension in draft.patch.extensions.iter_mut().flatten() {
                extension.needs_update = None;
            }
            Ok(())
        },
    },
    Rule {
        id: RuleId::Projection,
        applies: |input, draft| {
            let Some(Some(projection)) = &draft.patch.projection else {
                return false;
            };
            let previous = input.dataset.projection.as_ref().map(|p| p.code.as_str());
            previous != Some(projection.code.as_str())
                && has_projected_coordinates(&input.dataset.schema)
        },
        apply: reindex,
    },
    Rule {
        id: RuleId::GeoFields,
        applies: |input, draft| {
            draft
                .schema()
                .is_some_and(|schema| geo_fields_key(schema) != geo_fields_key(&input.dataset.schema))
        },
        apply: reindex,
    },
    Rule {
        id: RuleId::ParsingHints,
        applies: |input, draft| {
            changed_on_any_field(input.dataset, draft, |old, new| {
                old.separator != new.separator || old.time_zone != new.time_zone
            })
        },
        apply: reindex,
    },
    Rule {
        id: RuleId::RestRemovedFields,
        applies: |_, draft| !draft.removed_rest_props.is_empty(),
        apply: |_, draft| {
            draft.status = Some(DatasetStatus::Analyzed);
            Ok(())
        },
    },
    Rule {
        id: RuleId::TransformChange,
        applies: |input, draft| {
            input.dataset.has_file()
                && draft
                    .schema()
                    .is_some_and(|schema| transforms(schema) != transforms(&input.dataset.schema))
        },
        apply: |_, draft| {
            draft.status = Some(DatasetStatus::Analyzed);
            Ok(())
        },
    },
    Rule {
        id: RuleId::ValidationRules,
        applies: |input, draft| {
            let dataset = input.dataset;
            let Some(schema) = draft.schema() else {
                return false;
            };
            dataset.has_file()
                && matches!(
                    dataset.status,
                    DatasetStatus::ValidationUpdated | DatasetStatus::Finalized
                )
                && structurally_equal(schema, &dataset.schema, true)
                && has_validation_rules(schema)
                && !validation_compatible(schema, &dataset.schema)
        },
        apply: |_, draft| {
            draft.status = Some(DatasetStatus::ValidationUpdated);
            Ok(())
        },
    },
    Rule {
        id: RuleId::SchemaShape,
        applies: |input, draft| {
            draft
                .schema()
                .is_some_and(|schema| !structurally_equal(schema, &input.dataset.schema, true))
        },
        apply: |_, draft| {
            draft.attempt_mapping_update = true;
            draft.status = Some(DatasetStatus::Analyzed);
            Ok(())
        },
    },
    Rule {
        id: RuleId::FinalizeOnly,
        applies: |_, draft| draft.patch.thumbnails.is_some() || draft.patch.master_data.is_some(),
        apply: |_, draft| {
            draft.finalized = true;
            Ok(())
        },
    },
    Rule {
        id: RuleId::RestHistory,
        applies: |input, draft| match (&draft.patch.rest, &input.dataset.rest) {
            (Some(patched), Some(current)) => patched.store_updated_by != current.store_updated_by,
            _ => false,
        },
        apply: |_, draft| {
            draft.status = Some(DatasetStatus::Analyzed);
            Ok(())
        },
    },
    Rule {
        id: RuleId::RestConfig,
        applies: |_, draft| draft.patch.rest.is_some(),
        apply: |_, draft| {
            draft.status = Some(DatasetStatus::Indexed);
            Ok(())
        },
    },
];

fn new_file_reason(dataset: &Dataset) -> DraftReason {
    if dataset.has_file() {
        DraftReason::file_updated()
    } else {
        DraftReason::file_new()
    }
}

fn file_updated(input: &RuleInput<'_>, draft: &mut PlanDraft) -> EngineResult<()> {
    draft.status = Some(DatasetStatus::Loaded);
    draft.draft_reason = Some(new_file_reason(input.dataset));
    draft.data_updated = true;
    Ok(())
}

fn remote_file(input: &RuleInput<'_>, draft: &mut PlanDraft) -> EngineResult<()> {
    let previous = input.dataset.remote_file.as_ref();
    let Some(remote) = draft.patch.remote_file.as_mut() else {
        return Ok(());
    };
    let moved = previous.is_none_or(|p| p.url != remote.url || p.name != remote.name);
    if moved || remote.force_update {
        remote.force_update = true;
        draft.status = Some(DatasetStatus::Imported);
        draft.draft_reason = Some(new_file_reason(input.dataset));
    } else if let Some(previous) = previous {
        // same source: keep the validators of the last download
        remote.etag = previous.etag.clone().or(remote.etag.take());
        remote.last_modified = previous.last_modified.clone().or(remote.last_modified.take());
    }
    Ok(())
}

fn virtual_schema(input: &RuleInput<'_>, draft: &mut PlanDraft) -> EngineResult<()> {
    let declared = draft.schema().unwrap_or(&input.dataset.schema);
    let union = union_schema(declared, &input.ctx.virtual_children)?;
    let mut patched = draft.patch.apply_to(input.dataset)?;
    patched.schema = union;
    draft.patch.schema = Some(extended_schema(
        &patched,
        input.ctx.vocabulary,
        input.ctx.owner_vocabulary,
    ));
    draft.status = Some(DatasetStatus::Indexed);
    Ok(())
}

fn reindex(input: &RuleInput<'_>, draft: &mut PlanDraft) -> EngineResult<()> {
    draft.status = Some(input.dataset.reindexer_status());
    Ok(())
}

/// `(key, x-transform)` of every transformed field, sorted by key.
fn transforms(schema: &[Field]) -> Vec<(&str, &serde_json::Value)> {
    let mut transforms: Vec<_> = schema
        .iter()
        .filter_map(|field| field.transform.as_ref().map(|t| (field.key.as_str(), t)))
        .collect();
    transforms.sort_by(|a, b| a.0.cmp(b.0));
    transforms
}

fn changed_on_any_field(
    dataset: &Dataset,
    draft: &PlanDraft,
    changed: impl Fn(&Field, &Field) -> bool,
) -> bool {
    draft.schema().is_some_and(|schema| {
        schema
            .iter()
            .any(|field| dataset.field(&field.key).is_some_and(|old| changed(old, field)))
    })
}
