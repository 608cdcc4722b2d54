use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{self, Binary, Document, doc};
use mongodb::{Collection, Database};

use super::{is_duplicate_key, is_namespace_exists, serialization_error};
use crate::core::{CacheEntry, CacheStore, InsertOutcome};
use crate::error::EngineResult;

const COLLECTION: &str = "cache";

/// Cache entries in a capped collection keyed by hash.
///
/// The capped collection drops its oldest documents once full.
#[derive(Debug, Clone)]
pub struct MongoCacheStore {
    entries: Collection<Document>,
}

impl MongoCacheStore {
    /// Creates the capped collection if needed.
    pub async fn init(db: &Database, size_bytes: u64) -> EngineResult<Self> {
        match db.create_collection(COLLECTION).capped(true).size(size_bytes).await {
            Ok(()) => tracing::info!(size_bytes, "Created capped cache collection"),
            Err(e) if is_namespace_exists(&e) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self {
            entries: db.collection(COLLECTION),
        })
    }
}

fn to_document(entry: &CacheEntry) -> Document {
    doc! {
        "_id": &entry.hash,
        "datasetId": &entry.dataset_id,
        "value": Binary { subtype: BinarySubtype::Generic, bytes: entry.value.to_vec() },
        "createdAt": bson::DateTime::from_millis(entry.created_at.timestamp_millis()),
    }
}

fn from_document(document: &Document) -> EngineResult<CacheEntry> {
    let hash = document.get_str("_id").map_err(serialization_error)?;
    let dataset_id = document.get_str("datasetId").map_err(serialization_error)?;
    let value = document
        .get_binary_generic("value")
        .map_err(serialization_error)?;
    let created_at = document
        .get_datetime("createdAt")
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()))
        .unwrap_or_else(Utc::now);
    Ok(CacheEntry {
        hash: hash.to_string(),
        dataset_id: dataset_id.to_string(),
        value: Bytes::copy_from_slice(value),
        created_at,
    })
}

#[async_trait]
impl CacheStore for MongoCacheStore {
    fn backend_name(&self) -> &'static str {
        "mongodb"
    }

    async fn get(&self, hash: &str) -> EngineResult<Option<CacheEntry>> {
        self.entries
            .find_one(doc! {"_id": hash})
            .await?
            .as_ref()
            .map(from_document)
            .transpose()
    }

    async fn insert(&self, entry: CacheEntry) -> EngineResult<InsertOutcome> {
        match self.entries.insert_one(to_document(&entry)).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => Ok(InsertOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn evict_dataset(&self, dataset_id: &str) -> EngineResult<u64> {
        let result = self
            .entries
            .delete_many(doc! {"datasetId": dataset_id})
            .await?;
        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_document_roundtrip() {
        let entry = CacheEntry::new("abc", "ds", Bytes::from_static(b"\x1a\x02tile"));
        let document = to_document(&entry);
        assert_eq!(document.get_str("_id").unwrap(), "abc");
        let restored = from_document(&document).unwrap();
        assert_eq!(restored.value, entry.value);
        assert_eq!(restored.dataset_id, "ds");
        assert_eq!(
            restored.created_at.timestamp_millis(),
            entry.created_at.timestamp_millis()
        );
    }
}
