use async_trait::async_trait;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Collection, Database};

use super::serialization_error;
use crate::core::DocumentStore;
use crate::error::{EngineResult, ValidationError};
use crate::types::{Dataset, DatasetUpdate};

/// Dataset documents in the `datasets` collection, rows in `dataset-{id}`.
#[derive(Debug, Clone)]
pub struct MongoDocumentStore {
    db: Database,
    datasets: Collection<Document>,
}

impl MongoDocumentStore {
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            datasets: db.collection("datasets"),
        }
    }

    fn rows(&self, dataset_id: &str) -> Collection<Document> {
        self.db.collection(&format!("dataset-{}", dataset_id))
    }
}

/// Converts an update into a MongoDB update document.
///
/// Empty operators are left out, the server rejects them.
pub(crate) fn update_document(update: &DatasetUpdate) -> EngineResult<Document> {
    let mut document = Document::new();
    if !update.set.is_empty() {
        let mut set = Document::new();
        for (key, value) in &update.set {
            set.insert(key.clone(), bson::to_bson(value).map_err(serialization_error)?);
        }
        document.insert("$set", set);
    }
    if !update.unset.is_empty() {
        let unset: Document = update
            .unset
            .iter()
            .map(|key| (key.clone(), Bson::String(String::new())))
            .collect();
        document.insert("$unset", unset);
    }
    Ok(document)
}

fn to_dataset(document: Document) -> EngineResult<Dataset> {
    bson::from_document(document).map_err(serialization_error)
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn find_dataset(&self, id: &str) -> EngineResult<Option<Dataset>> {
        self.datasets
            .find_one(doc! {"id": id})
            .projection(doc! {"_id": 0})
            .await?
            .map(to_dataset)
            .transpose()
    }

    async fn update_dataset(&self, id: &str, update: &DatasetUpdate) -> EngineResult<Dataset> {
        if update.is_empty() {
            return self
                .find_dataset(id)
                .await?
                .ok_or_else(|| ValidationError::DatasetNotFound { id: id.to_string() }.into());
        }
        let document = self
            .datasets
            .find_one_and_update(doc! {"id": id}, update_document(update)?)
            .projection(doc! {"_id": 0})
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| ValidationError::DatasetNotFound { id: id.to_string() })?;
        to_dataset(document)
    }

    async fn replace_dataset(&self, dataset: &Dataset) -> EngineResult<()> {
        let document = bson::to_document(dataset).map_err(serialization_error)?;
        self.datasets
            .replace_one(doc! {"id": &dataset.id}, document)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete_dataset(&self, id: &str) -> EngineResult<bool> {
        let result = self.datasets.delete_one(doc! {"id": id}).await?;
        if result.deleted_count > 0 {
            self.rows(id).drop().await?;
        }
        Ok(result.deleted_count > 0)
    }

    async fn unset_rows_fields(&self, dataset_id: &str, keys: &[String]) -> EngineResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let unset: Document = keys
            .iter()
            .map(|key| (key.clone(), Bson::String(String::new())))
            .collect();
        let exists: Vec<Document> = keys.iter().map(|key| doc! {key: {"$exists": true}}).collect();
        let result = self
            .rows(dataset_id)
            .update_many(doc! {"$or": exists}, doc! {"$unset": unset})
            .await?;
        tracing::debug!(dataset_id, modified = result.modified_count, "Unset row fields");
        Ok(result.modified_count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_update_document() {
        let mut update = DatasetUpdate::default();
        update.insert("status", json!("analyzed"));
        update.remove("description");
        let document = update_document(&update).unwrap();
        assert_eq!(
            document.get_document("$set").unwrap().get_str("status").unwrap(),
            "analyzed"
        );
        assert!(document.get_document("$unset").unwrap().contains_key("description"));
    }

    #[test]
    fn test_empty_operators_are_omitted() {
        let mut update = DatasetUpdate::default();
        update.remove("title");
        let document = update_document(&update).unwrap();
        assert!(!document.contains_key("$set"));
    }
}
