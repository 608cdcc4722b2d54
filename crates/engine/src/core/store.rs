//! Dataset document storage.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{Dataset, DatasetUpdate};

/// Storage of dataset documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns a short name for logs.
    fn backend_name(&self) -> &'static str;

    /// Returns the dataset with the given id.
    async fn find_dataset(&self, id: &str) -> EngineResult<Option<Dataset>>;

    /// Applies an atomic `$set`/`$unset` update and returns the new document.
    ///
    /// Fails with `ValidationError::DatasetNotFound` if the dataset is gone.
    async fn update_dataset(&self, id: &str, update: &DatasetUpdate) -> EngineResult<Dataset>;

    /// Inserts or replaces a whole dataset document.
    async fn replace_dataset(&self, dataset: &Dataset) -> EngineResult<()>;

    /// Removes a dataset document. Returns false if there was none.
    async fn delete_dataset(&self, id: &str) -> EngineResult<bool>;

    /// Removes properties from every row of a REST dataset.
    ///
    /// Returns the number of rows modified.
    async fn unset_rows_fields(&self, dataset_id: &str, keys: &[String]) -> EngineResult<u64>;
}
