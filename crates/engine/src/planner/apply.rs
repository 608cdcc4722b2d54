//! Applying plans to the stores.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::core::{DocumentStore, LockService, SearchEngine};
use crate::error::{EngineResult, LockError, ValidationError};
use crate::planner::{PatchPlan, PatchPlanner, PlanContext};
use crate::schema::Vocabulary;
use crate::types::{Dataset, DatasetPatch, DatasetStatus, Field, UserRef};

/// Caller options of [`PatchService::apply`].
#[derive(Debug, Clone, Default)]
pub struct PatchOptions {
    pub user: Option<UserRef>,
    /// Write into the draft copy of the dataset.
    pub draft: bool,
    pub forbid_breaking_changes: bool,
    /// Private concepts of the dataset owner.
    pub owner_vocabulary: Option<Vocabulary>,
}

/// A plan and the dataset after it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPatch {
    pub plan: PatchPlan,
    pub dataset: Dataset,
}

/// Plans patches and writes them under a per-dataset lock.
#[derive(Clone)]
pub struct PatchService {
    store: Arc<dyn DocumentStore>,
    search: Arc<dyn SearchEngine>,
    locks: Arc<dyn LockService>,
    cache: ResultCache,
    planner: PatchPlanner,
}

impl std::fmt::Debug for PatchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchService")
            .field("store", &self.store.backend_name())
            .field("search", &self.search.backend_name())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

fn lock_key(dataset_id: &str) -> String {
    format!("dataset:{}", dataset_id)
}

impl PatchService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        search: Arc<dyn SearchEngine>,
        locks: Arc<dyn LockService>,
        cache: ResultCache,
    ) -> Self {
        Self {
            store,
            search,
            locks,
            cache,
            planner: PatchPlanner::new(),
        }
    }

    /// Plans and applies a patch.
    ///
    /// Fails with `LockError::Busy` while another operation holds the
    /// dataset. The lock is released on every path.
    pub async fn apply(
        &self,
        dataset_id: &str,
        patch: &DatasetPatch,
        options: &PatchOptions,
    ) -> EngineResult<AppliedPatch> {
        let key = lock_key(dataset_id);
        let token = self
            .locks
            .acquire(&key)
            .await?
            .ok_or(LockError::Busy { key })?;

        let result = self.apply_locked(dataset_id, patch, options).await;
        if let Err(e) = self.locks.release(&token).await {
            warn!(error = %e, dataset_id, "Failed to release dataset lock");
        }
        let applied = result?;

        if applied.plan.invalidates_cache() {
            self.cache.evict_dataset(dataset_id).await;
        }
        Ok(applied)
    }

    async fn apply_locked(
        &self,
        dataset_id: &str,
        patch: &DatasetPatch,
        options: &PatchOptions,
    ) -> EngineResult<AppliedPatch> {
        let dataset = self.find(dataset_id).await?;
        let base = if options.draft {
            dataset.with_draft_applied()?
        } else {
            dataset.clone()
        };

        let mut ctx = PlanContext::new(Utc::now()).with_virtual_children(self.children_schemas(&base).await?);
        ctx.user = options.user.clone();
        ctx.draft = options.draft;
        ctx.forbid_breaking_changes = options.forbid_breaking_changes;
        let ctx = match &options.owner_vocabulary {
            Some(vocabulary) => ctx.with_owner_vocabulary(vocabulary),
            None => ctx,
        };

        let mut plan = self.planner.plan(&base, patch, &ctx)?;
        if plan.noop {
            return Ok(AppliedPatch { plan, dataset });
        }

        if !plan.removed_rest_props.is_empty() {
            let modified = self
                .store
                .unset_rows_fields(dataset_id, &plan.removed_rest_props)
                .await?;
            debug!(dataset_id, modified, props = ?plan.removed_rest_props, "Removed REST properties");
        }

        if plan.attempt_mapping_update && !plan.draft {
            plan = self.try_mapping_update(plan).await?;
        }

        let dataset = self.store.update_dataset(dataset_id, &plan.to_update()).await?;
        info!(
            dataset_id,
            rule = plan.matched_rule.map(|r| r.as_str()).unwrap_or("none"),
            status = %plan.status,
            draft = plan.draft,
            "Applied patch"
        );
        Ok(AppliedPatch { plan, dataset })
    }

    async fn try_mapping_update(&self, plan: PatchPlan) -> EngineResult<PatchPlan> {
        let Some(schema) = plan.schema.clone() else {
            return Ok(plan);
        };
        match self.search.update_mapping(&plan.dataset_id, &schema).await {
            Ok(()) => {
                debug!(dataset_id = %plan.dataset_id, "Mapping updated in place");
                Ok(plan.with_status(DatasetStatus::Indexed))
            }
            Err(e) if e.is_recoverable_index_error() => {
                warn!(error = %e, dataset_id = %plan.dataset_id, "Mapping update not applied, reindexing");
                Ok(plan)
            }
            Err(e) => Err(e),
        }
    }

    async fn find(&self, dataset_id: &str) -> EngineResult<Dataset> {
        self.store
            .find_dataset(dataset_id)
            .await?
            .ok_or_else(|| {
                ValidationError::DatasetNotFound {
                    id: dataset_id.to_string(),
                }
                .into()
            })
    }

    async fn children_schemas(&self, dataset: &Dataset) -> EngineResult<Vec<Vec<Field>>> {
        let Some(config) = dataset.virtual_config.as_ref().filter(|_| dataset.is_virtual) else {
            return Ok(Vec::new());
        };
        let mut schemas = Vec::with_capacity(config.children.len());
        for child in &config.children {
            match self.store.find_dataset(child).await? {
                Some(child) => schemas.push(child.schema),
                None => warn!(dataset_id = %dataset.id, child = %child, "Missing virtual child"),
            }
        }
        Ok(schemas)
    }

    /// Deletes a dataset: its index, its cache entries, then its document.
    ///
    /// Returns false if the dataset did not exist.
    pub async fn delete_dataset(&self, dataset_id: &str) -> EngineResult<bool> {
        self.search.delete(dataset_id).await?;
        self.cache.evict_dataset(dataset_id).await;
        let deleted = self.store.delete_dataset(dataset_id).await?;
        info!(dataset_id, deleted, "Deleted dataset");
        Ok(deleted)
    }

    /// Sends a dataset back through indexing.
    pub async fn reindex(&self, dataset_id: &str) -> EngineResult<AppliedPatch> {
        let dataset = self.find(dataset_id).await?;
        let plan = self.planner.reindex(&dataset);
        self.write_status_plan(plan).await
    }

    /// Sends a dataset back through finalization.
    pub async fn refinalize(&self, dataset_id: &str) -> EngineResult<AppliedPatch> {
        let dataset = self.find(dataset_id).await?;
        let plan = self.planner.refinalize(&dataset);
        self.write_status_plan(plan).await
    }

    async fn write_status_plan(&self, plan: PatchPlan) -> EngineResult<AppliedPatch> {
        let dataset = self.store.update_dataset(&plan.dataset_id, &plan.to_update()).await?;
        if plan.invalidates_cache() {
            self.cache.evict_dataset(&plan.dataset_id).await;
        }
        Ok(AppliedPatch { plan, dataset })
    }
}
