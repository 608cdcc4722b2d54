//! Search engine abstraction.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{Dataset, Field, SearchQuery, SearchResponse};

/// Row search over the indices of datasets.
///
/// Implementations resolve the indices of a dataset themselves: a virtual
/// dataset is searched through its children.
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Returns a short name for logs.
    fn backend_name(&self) -> &'static str;

    /// Counts the rows matching a query. Size, sort and cursor are ignored.
    async fn count(&self, dataset: &Dataset, query: &SearchQuery) -> EngineResult<u64>;

    /// Returns one page of rows.
    ///
    /// Every hit carries the sort values of the query's stable sort, so the
    /// last hit can seed the next page.
    async fn search(&self, dataset: &Dataset, query: &SearchQuery) -> EngineResult<SearchResponse>;

    /// Updates the mapping of a live index in place.
    ///
    /// Fails with `IndexError::MappingIncompatible` when a field changes
    /// type and with `IndexError::IndexNotFound` when the dataset has no
    /// index; the caller then falls back to a full reindex.
    async fn update_mapping(&self, dataset_id: &str, schema: &[Field]) -> EngineResult<()>;

    /// Deletes the index of a dataset, if any.
    async fn delete(&self, dataset_id: &str) -> EngineResult<()>;
}
