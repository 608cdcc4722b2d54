use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::planner::RuleId;
use crate::schema::BreakingChange;
use crate::types::{DatasetStatus, DatasetUpdate, Field};

/// The resolved outcome of planning a patch.
///
/// A plan is a value: it describes what to write and which side effects the
/// applier must run, but performs none of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchPlan {
    pub dataset_id: String,
    /// Nothing would change.
    pub noop: bool,
    /// The rule that decided the status, if any.
    pub matched_rule: Option<RuleId>,
    pub previous_status: DatasetStatus,
    pub status: DatasetStatus,
    /// Top-level attributes to write. `null` removes the attribute.
    pub changes: BTreeMap<String, Value>,
    /// The schema written by this plan, when it writes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<Field>>,
    /// Row properties to remove from a REST dataset.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed_rest_props: Vec<String>,
    /// Try to update the live index mapping instead of reindexing.
    pub attempt_mapping_update: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breaking_changes: Vec<BreakingChange>,
    /// The dataset failed with a non-retryable error and was not resumed.
    pub manual_restart_required: bool,
    /// Changes target the draft copy.
    pub draft: bool,
}

impl PatchPlan {
    /// A plan that writes nothing.
    pub fn noop(dataset_id: impl Into<String>, status: DatasetStatus, draft: bool) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            noop: true,
            matched_rule: None,
            previous_status: status,
            status,
            changes: BTreeMap::new(),
            schema: None,
            removed_rest_props: Vec::new(),
            attempt_mapping_update: false,
            breaking_changes: Vec::new(),
            manual_restart_required: false,
            draft,
        }
    }

    /// A plan that only moves the status.
    pub fn status_only(
        dataset_id: impl Into<String>,
        previous: DatasetStatus,
        status: DatasetStatus,
        draft: bool,
    ) -> Self {
        Self {
            noop: false,
            ..Self::noop(dataset_id, previous, draft)
        }
        .with_status(status)
    }

    /// Returns the same plan moving to another status.
    pub fn with_status(mut self, status: DatasetStatus) -> Self {
        self.status = status;
        if status == self.previous_status {
            self.changes.remove("status");
        } else {
            self.changes
                .insert("status".to_string(), Value::String(status.as_str().to_string()));
        }
        self
    }

    pub fn status_changed(&self) -> bool {
        self.status != self.previous_status
    }

    /// Returns the new finalization date, when the plan bumps it.
    pub fn finalized_at(&self) -> Option<DateTime<Utc>> {
        self.changes
            .get("finalizedAt")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Returns true if cached results of the dataset become stale.
    pub fn invalidates_cache(&self) -> bool {
        !self.noop && (self.status_changed() || self.finalized_at().is_some())
    }

    /// Returns the store update, with every path under `draft.` in draft mode.
    pub fn to_update(&self) -> DatasetUpdate {
        let mut update = DatasetUpdate::default();
        for (key, value) in &self.changes {
            update.insert(key.clone(), value.clone());
        }
        if self.draft {
            update.prefixed("draft")
        } else {
            update
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_with_status_tracks_changes() {
        let plan = PatchPlan::noop("ds", DatasetStatus::Finalized, false);
        let plan = PatchPlan {
            noop: false,
            ..plan
        }
        .with_status(DatasetStatus::Analyzed);
        assert_eq!(plan.changes["status"], json!("analyzed"));
        let plan = plan.with_status(DatasetStatus::Finalized);
        assert!(!plan.changes.contains_key("status"));
        assert!(!plan.status_changed());
    }

    #[test]
    fn test_to_update_prefixes_draft_paths() {
        let mut plan = PatchPlan::status_only(
            "ds",
            DatasetStatus::Finalized,
            DatasetStatus::Indexed,
            true,
        );
        plan.changes.insert("description".to_string(), Value::Null);
        let update = plan.to_update();
        assert_eq!(update.set["draft.status"], json!("indexed"));
        assert!(update.unset.contains("draft.description"));
    }

    #[test]
    fn test_cache_invalidation() {
        let plan = PatchPlan::noop("ds", DatasetStatus::Finalized, false);
        assert!(!plan.invalidates_cache());
        let mut plan = PatchPlan {
            noop: false,
            ..plan
        };
        plan.changes
            .insert("finalizedAt".to_string(), json!("2024-05-01T10:00:00Z"));
        assert!(plan.invalidates_cache());
    }
}
