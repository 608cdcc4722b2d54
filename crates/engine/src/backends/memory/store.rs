use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use crate::core::DocumentStore;
use crate::error::{EngineResult, ValidationError};
use crate::types::{Dataset, DatasetUpdate};

/// Dataset documents and REST rows kept as JSON in memory.
///
/// Documents are stored in their serialized form so that updates go through
/// the same dotted-path `$set`/`$unset` semantics as a document database.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    datasets: RwLock<HashMap<String, Value>>,
    rows: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given datasets.
    pub fn with_datasets(datasets: impl IntoIterator<Item = Dataset>) -> EngineResult<Self> {
        let store = Self::new();
        {
            let mut documents = store.datasets.write();
            for dataset in datasets {
                documents.insert(dataset.id.clone(), serde_json::to_value(&dataset)?);
            }
        }
        Ok(store)
    }

    /// Appends rows to a REST dataset.
    pub fn insert_rows(&self, dataset_id: &str, rows: impl IntoIterator<Item = Value>) {
        self.rows
            .write()
            .entry(dataset_id.to_string())
            .or_default()
            .extend(rows);
    }

    /// Returns the rows of a REST dataset.
    pub fn rows(&self, dataset_id: &str) -> Vec<Value> {
        self.rows.read().get(dataset_id).cloned().unwrap_or_default()
    }

    /// Returns the raw stored document of a dataset.
    pub fn document(&self, id: &str) -> Option<Value> {
        self.datasets.read().get(id).cloned()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn find_dataset(&self, id: &str) -> EngineResult<Option<Dataset>> {
        let document = self.datasets.read().get(id).cloned();
        match document {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    async fn update_dataset(&self, id: &str, update: &DatasetUpdate) -> EngineResult<Dataset> {
        let mut documents = self.datasets.write();
        let document = documents
            .get_mut(id)
            .ok_or_else(|| ValidationError::DatasetNotFound { id: id.to_string() })?;
        let mut updated = document.clone();
        update.apply_to(&mut updated);
        let dataset: Dataset = serde_json::from_value(updated.clone())?;
        *document = updated;
        Ok(dataset)
    }

    async fn replace_dataset(&self, dataset: &Dataset) -> EngineResult<()> {
        let document = serde_json::to_value(dataset)?;
        self.datasets.write().insert(dataset.id.clone(), document);
        Ok(())
    }

    async fn delete_dataset(&self, id: &str) -> EngineResult<bool> {
        self.rows.write().remove(id);
        Ok(self.datasets.write().remove(id).is_some())
    }

    async fn unset_rows_fields(&self, dataset_id: &str, keys: &[String]) -> EngineResult<u64> {
        let mut rows = self.rows.write();
        let Some(rows) = rows.get_mut(dataset_id) else {
            return Ok(0);
        };
        let mut modified = 0;
        for row in rows.iter_mut() {
            let Some(object) = row.as_object_mut() else {
                continue;
            };
            let before = object.len();
            object.retain(|key, _| !keys.contains(key));
            if object.len() != before {
                modified += 1;
            }
        }
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::DatasetStatus;

    #[tokio::test]
    async fn test_update_sets_and_unsets_paths() {
        let mut dataset = Dataset::new("ds");
        dataset.title = Some("Old".to_string());
        dataset.description = Some("gone soon".to_string());
        let store = MemoryDocumentStore::with_datasets([dataset]).unwrap();

        let mut update = DatasetUpdate::default();
        update.insert("title", json!("New"));
        update.insert("status", json!("analyzed"));
        update.remove("description");
        let updated = store.update_dataset("ds", &update).await.unwrap();
        assert_eq!(updated.title.as_deref(), Some("New"));
        assert_eq!(updated.status, DatasetStatus::Analyzed);
        assert!(updated.description.is_none());

        let found = store.find_dataset("ds").await.unwrap().unwrap();
        assert_eq!(found, updated);
    }

    #[tokio::test]
    async fn test_update_missing_dataset() {
        let store = MemoryDocumentStore::new();
        let err = store
            .update_dataset("nope", &DatasetUpdate::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_unset_rows_fields() {
        let store = MemoryDocumentStore::new();
        store.insert_rows(
            "ds",
            vec![json!({"_id": "1", "a": 1, "b": 2}), json!({"_id": "2", "a": 3})],
        );
        let modified = store
            .unset_rows_fields("ds", &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(modified, 1);
        assert!(store.rows("ds").iter().all(|r| r.get("b").is_none()));
    }
}
