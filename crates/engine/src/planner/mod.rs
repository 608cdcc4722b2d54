//! Patch planning.
//!
//! [`PatchPlanner::plan`] resolves a [`DatasetPatch`] against the current
//! dataset and returns a [`PatchPlan`]: what to write, which lifecycle status
//! the dataset moves to, and which side effects the applier must run. The
//! planner reads nothing but its arguments.
//!
//! Planning runs in three phases:
//!
//! 1. normalization: the primary key mode is checked, calculated fields are
//!    stripped, extension columns follow the active extensions and the
//!    schema is rebuilt as an extended schema, then every attribute equal to
//!    the current value is elided;
//! 2. the ordered rules of [`RuleId`], first match wins;
//! 3. bookkeeping: publications, update date and author.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use tessera_engine::planner::{PatchPlanner, PlanContext};
//! use tessera_engine::types::{Dataset, DatasetPatch, DatasetStatus};
//!
//! let mut dataset = Dataset::new("stations");
//! dataset.status = DatasetStatus::Finalized;
//! let patch = DatasetPatch {
//!     thumbnails: Some(serde_json::json!({"resizeMode": "crop"})),
//!     ..Default::default()
//! };
//! let plan = PatchPlanner::new()
//!     .plan(&dataset, &patch, &PlanContext::new(Utc::now()))
//!     .unwrap();
//! assert_eq!(plan.status, DatasetStatus::Finalized);
//! assert!(plan.finalized_at().is_some());
//! ```

pub mod apply;
pub mod draft;
pub mod lifecycle;
mod plan;
mod rules;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{ConflictError, EngineResult, ValidationError};
use crate::schema::{Vocabulary, breaking_changes, extended_schema};
use crate::types::{
    Dataset, DatasetPatch, DatasetStatus, Extension, Field, PublicationStatus, UserRef,
};

pub use apply::{AppliedPatch, PatchOptions, PatchService};
pub use plan::PatchPlan;
pub use rules::RuleId;

use rules::{PlanDraft, RULES, Rule, RuleInput};

/// Everything a plan depends on besides the dataset and the patch.
#[derive(Debug, Clone)]
pub struct PlanContext<'a> {
    pub now: DateTime<Utc>,
    /// Author of the change.
    pub user: Option<UserRef>,
    pub vocabulary: &'a Vocabulary,
    /// Private concepts of the dataset owner.
    pub owner_vocabulary: Option<&'a Vocabulary>,
    /// Schemas of the children of a virtual dataset.
    pub virtual_children: Vec<Vec<Field>>,
    /// Write into the draft copy.
    pub draft: bool,
    /// Refuse patches that break API consumers.
    pub forbid_breaking_changes: bool,
}

impl PlanContext<'static> {
    /// A context using the standard vocabulary.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            user: None,
            vocabulary: Vocabulary::standard(),
            owner_vocabulary: None,
            virtual_children: Vec::new(),
            draft: false,
            forbid_breaking_changes: false,
        }
    }
}

impl<'a> PlanContext<'a> {
    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_owner_vocabulary(mut self, vocabulary: &'a Vocabulary) -> Self {
        self.owner_vocabulary = Some(vocabulary);
        self
    }

    pub fn with_virtual_children(mut self, children: Vec<Vec<Field>>) -> Self {
        self.virtual_children = children;
        self
    }

    pub fn in_draft(mut self) -> Self {
        self.draft = true;
        self
    }

    pub fn forbidding_breaking_changes(mut self) -> Self {
        self.forbid_breaking_changes = true;
        self
    }
}

/// Resolves patches into plans with an ordered decision table.
#[derive(Clone, Copy)]
pub struct PatchPlanner {
    rules: &'static [Rule],
}

impl std::fmt::Debug for PatchPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchPlanner")
            .field("rules", &self.rules.iter().map(|r| r.id).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for PatchPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchPlanner {
    pub fn new() -> Self {
        Self { rules: RULES }
    }

    /// Plans a patch.
    ///
    /// Fails when the patch changes the primary key mode, submits calculated
    /// fields the dataset does not have, mixes incompatible virtual children,
    /// or breaks the schema while `forbid_breaking_changes` is set.
    pub fn plan(
        &self,
        dataset: &Dataset,
        patch: &DatasetPatch,
        ctx: &PlanContext<'_>,
    ) -> EngineResult<PatchPlan> {
        let patch = normalize(dataset, patch, ctx)?.elide_noops(dataset)?;
        if patch.is_empty() {
            tracing::debug!(dataset_id = %dataset.id, "Patch changes nothing");
            return Ok(PatchPlan::noop(&dataset.id, dataset.status, ctx.draft));
        }

        let mut draft = PlanDraft::new(patch);
        let resume = resume_from_error(dataset);
        if let Resume::Status(status) = resume {
            draft.status = Some(status);
        }
        draft.removed_rest_props = removed_rest_props(dataset, &draft.patch);

        let breaking = draft
            .patch
            .schema
            .as_deref()
            .map(|schema| breaking_changes(&dataset.schema, schema))
            .unwrap_or_default();
        if ctx.forbid_breaking_changes && !breaking.is_empty() {
            return Err(ConflictError::BreakingChanges { changes: breaking }.into());
        }

        let input = RuleInput { dataset, ctx };
        let matched = self.rules.iter().find(|rule| (rule.applies)(&input, &draft));
        if let Some(rule) = matched {
            (rule.apply)(&input, &mut draft)?;
        }
        let matched_rule = matched.map(|rule| rule.id);

        let plan = finish(dataset, draft, resume, ctx, matched_rule, breaking)?;
        tracing::debug!(
            dataset_id = %dataset.id,
            rule = matched_rule.map(|r| r.as_str()).unwrap_or("none"),
            status = %plan.status,
            "Planned patch"
        );
        Ok(plan)
    }

    /// Plans a full reindex: every row is processed again.
    pub fn reindex(&self, dataset: &Dataset) -> PatchPlan {
        let status = if dataset.is_virtual {
            DatasetStatus::Indexed
        } else if dataset.is_rest {
            DatasetStatus::Analyzed
        } else {
            DatasetStatus::Loaded
        };
        self.status_plan(dataset, status)
    }

    /// Plans a new finalization of the indexed rows.
    pub fn refinalize(&self, dataset: &Dataset) -> PatchPlan {
        self.status_plan(dataset, DatasetStatus::Indexed)
    }

    fn status_plan(&self, dataset: &Dataset, status: DatasetStatus) -> PatchPlan {
        let draft = dataset.draft_reason.is_some();
        let previous = if draft {
            dataset.draft.as_ref().map_or(dataset.status, |d| d.status)
        } else {
            dataset.status
        };
        PatchPlan::status_only(&dataset.id, previous, status, draft)
    }
}

#[derive(Clone, Copy)]
enum Resume {
    NotInError,
    Status(DatasetStatus),
    ManualRestart,
}

fn resume_from_error(dataset: &Dataset) -> Resume {
    if dataset.status != DatasetStatus::Error {
        return Resume::NotInError;
    }
    if dataset.error_is_final() {
        return Resume::ManualRestart;
    }
    Resume::Status(dataset.error_status.unwrap_or_else(|| dataset.reset_status()))
}

fn normalize(
    dataset: &Dataset,
    patch: &DatasetPatch,
    ctx: &PlanContext<'_>,
) -> EngineResult<DatasetPatch> {
    let mut patch = patch.clone();

    if let Some(rest) = patch.rest.as_mut() {
        let current = dataset.rest.as_ref().and_then(|r| r.primary_key_mode.clone());
        match rest.primary_key_mode.clone() {
            None => rest.primary_key_mode = current,
            Some(requested) if current.as_deref() != Some(requested.as_str()) => {
                return Err(ValidationError::PrimaryKeyModeChange {
                    current: current.unwrap_or_else(|| "none".to_string()),
                    requested,
                }
                .into());
            }
            Some(_) => {}
        }
    }

    if let Some(schema) = patch.schema.take() {
        let mut rejected = Vec::new();
        let kept: Vec<Field> = schema
            .into_iter()
            .filter(|field| {
                if !field.is_system() {
                    return true;
                }
                // echoes of fields the platform already computes are dropped
                if !dataset.field(&field.key).is_some_and(|f| f.calculated) {
                    rejected.push(field.key.clone());
                }
                false
            })
            .collect();
        if !rejected.is_empty() {
            return Err(ValidationError::CalculatedField { keys: rejected }.into());
        }
        patch.schema = Some(kept);
    }

    let extensions = patch.extensions.as_ref().or(dataset.extensions.as_ref());
    if let Some(extensions) = extensions
        && (patch.extensions.is_some() || patch.schema.is_some())
    {
        let active: Vec<String> = extensions
            .iter()
            .filter(|e| e.active)
            .filter_map(Extension::id)
            .collect();
        let mut schema = patch.schema.take().unwrap_or_else(|| {
            dataset
                .schema
                .iter()
                .filter(|f| !f.is_system())
                .cloned()
                .collect()
        });
        // extension columns follow their step, not the submitted schema
        for field in dataset.schema.iter().filter(|f| f.is_extension()) {
            if !schema.iter().any(|f| f.key == field.key) {
                schema.push(field.clone());
            }
        }
        schema.retain(|f| f.extension.as_ref().is_none_or(|id| active.contains(id)));
        patch.schema = Some(schema);
    }

    let reshapes = patch.schema.is_some()
        || patch.attachments_as_image.is_some()
        || (dataset.is_rest && patch.rest.is_some());
    if reshapes {
        let patched = patch.apply_to(dataset)?;
        patch.schema = Some(extended_schema(
            &patched,
            ctx.vocabulary,
            ctx.owner_vocabulary,
        ));
    }

    Ok(patch)
}

/// Row properties a REST patch drops, extension columns included.
fn removed_rest_props(dataset: &Dataset, patch: &DatasetPatch) -> Vec<String> {
    if !dataset.is_rest {
        return Vec::new();
    }
    let mut removed: Vec<String> = patch
        .schema
        .iter()
        .flat_map(|schema| {
            dataset
                .schema
                .iter()
                .filter(|f| !f.is_system())
                .filter(move |f| !schema.iter().any(|p| p.key == f.key))
        })
        .map(|f| f.key.clone())
        .collect();
    let stops_storing_updater = dataset.stores_updated_by()
        && patch.rest.as_ref().is_some_and(|r| !r.store_updated_by);
    if stops_storing_updater {
        removed.push("_updatedBy".to_string());
        removed.push("_updatedByName".to_string());
    }
    removed
}

fn finish(
    dataset: &Dataset,
    mut draft: PlanDraft,
    resume: Resume,
    ctx: &PlanContext<'_>,
    matched_rule: Option<RuleId>,
    breaking: Vec<crate::schema::BreakingChange>,
) -> EngineResult<PatchPlan> {
    let now = Value::String(ctx.now.to_rfc3339());
    let manual_restart_required = matches!(resume, Resume::ManualRestart);

    if draft.patch.publications.is_none()
        && let Some(publications) = dataset.publications.as_ref().filter(|p| !p.is_empty())
    {
        let mut publications = publications.clone();
        for publication in &mut publications {
            if publication.status != PublicationStatus::Deleted {
                publication.status = PublicationStatus::Waiting;
            }
        }
        draft.patch.publications = Some(publications);
    }

    let mut changes = match serde_json::to_value(&draft.patch)? {
        Value::Object(map) => map.into_iter().collect(),
        _ => std::collections::BTreeMap::new(),
    };
    if let Some(reason) = &draft.draft_reason {
        changes.insert("draftReason".to_string(), serde_json::to_value(reason)?);
    }
    if draft.data_updated {
        changes.insert("dataUpdatedAt".to_string(), now.clone());
    }
    if draft.finalized {
        changes.insert("finalizedAt".to_string(), now.clone());
    }
    changes.insert("updatedAt".to_string(), now);
    if let Some(user) = &ctx.user {
        changes.insert("updatedBy".to_string(), serde_json::to_value(user)?);
    }

    let status = if manual_restart_required {
        dataset.status
    } else {
        draft.status.unwrap_or(dataset.status)
    };
    if status != DatasetStatus::Error {
        if dataset.error_status.is_some() {
            changes.insert("errorStatus".to_string(), Value::Null);
        }
        if dataset.error_retry.is_some() {
            changes.insert("errorRetry".to_string(), Value::Null);
        }
    }

    let plan = PatchPlan {
        dataset_id: dataset.id.clone(),
        noop: false,
        matched_rule,
        previous_status: dataset.status,
        status: dataset.status,
        changes,
        schema: draft.patch.schema,
        removed_rest_props: draft.removed_rest_props,
        attempt_mapping_update: draft.attempt_mapping_update,
        breaking_changes: breaking,
        manual_restart_required,
        draft: ctx.draft,
    };
    Ok(plan.with_status(status))
}
