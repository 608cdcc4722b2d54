//! Dataset documents and their lifecycle status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::field::{Field, is_false};

/// Prefix of error messages that must not be retried automatically.
pub const NO_RETRY_PREFIX: &str = "[noretry] ";

/// Lifecycle status of a dataset.
///
/// The processing pipeline walks these in order:
///
/// ```text
/// remote → imported|uploaded → loaded → analyzed → validated|validation-updated → indexed → extended → finalized
/// ```
///
/// `error` is reachable from any step, `draft` mirrors the pipeline for
/// unpublished edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetStatus {
    Remote,
    Imported,
    Uploaded,
    #[default]
    Loaded,
    Analyzed,
    Validated,
    ValidationUpdated,
    Indexed,
    Extended,
    Finalized,
    Error,
    Draft,
}

impl DatasetStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Remote => "remote",
            DatasetStatus::Imported => "imported",
            DatasetStatus::Uploaded => "uploaded",
            DatasetStatus::Loaded => "loaded",
            DatasetStatus::Analyzed => "analyzed",
            DatasetStatus::Validated => "validated",
            DatasetStatus::ValidationUpdated => "validation-updated",
            DatasetStatus::Indexed => "indexed",
            DatasetStatus::Extended => "extended",
            DatasetStatus::Finalized => "finalized",
            DatasetStatus::Error => "error",
            DatasetStatus::Draft => "draft",
        }
    }

    /// Returns true if read requests may be served in this status.
    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Indexed | DatasetStatus::Extended | DatasetStatus::Finalized
        )
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored source file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
}

/// Remote source of a dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Forces a new download even when url and name did not change.
    #[serde(default, skip_serializing_if = "is_false")]
    pub force_update: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<Value>,
}

/// Configuration of a REST (editable lines) dataset.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestConfig {
    #[serde(default, skip_serializing_if = "is_false")]
    pub history: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub line_ownership: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub store_updated_by: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<Value>,
}

/// Configuration of a virtual dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VirtualConfig {
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Value>,
}

/// An enrichment step applied to dataset rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub extension_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
}

impl Extension {
    /// Returns the id carried by the `x-extension` of the fields this step
    /// produces, as `remoteService/action`.
    pub fn id(&self) -> Option<String> {
        match (&self.remote_service, &self.action) {
            (Some(service), Some(action)) => Some(format!("{}/{}", service, action)),
            _ => None,
        }
    }
}

/// Cartographic projection of coordinate columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Projection {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Status of a publication to an external catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Waiting,
    Published,
    Error,
    Deleted,
}

/// A publication of the dataset to an external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: String,
    pub catalog: String,
    pub status: PublicationStatus,
}

/// Why a draft was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftReason {
    pub key: String,
    pub message: String,
}

impl DraftReason {
    /// A new source file replaced an existing one.
    pub fn file_updated() -> Self {
        Self {
            key: "file-updated".to_string(),
            message: "Nouveau fichier chargé sur un jeu de données existant".to_string(),
        }
    }

    /// The first source file of the dataset.
    pub fn file_new() -> Self {
        Self {
            key: "file-new".to_string(),
            message: "Nouveau jeu de données chargé en mode brouillon".to_string(),
        }
    }
}

/// The user responsible for a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Owner of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(rename = "type")]
    pub owner_type: String,
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Size information of the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<IndexedStorage>,
}

/// Size of the indexed documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexedStorage {
    pub size: u64,
}

/// A published dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema: Vec<Field>,
    #[serde(default)]
    pub status: DatasetStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_file: Option<RemoteFile>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_virtual: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_rest: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_meta_only: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestConfig>,
    #[serde(rename = "virtual", default, skip_serializing_if = "Option::is_none")]
    pub virtual_config: Option<VirtualConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<Extension>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments_as_image: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publications: Option<Vec<Publication>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserRef>,

    /// Step that failed when the dataset entered `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_status: Option<DatasetStatus>,
    /// Next automatic retry of the failed step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_retry: Option<DateTime<Utc>>,
    /// Message of the last processing error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_reason: Option<DraftReason>,
    /// Shadow copy holding unpublished edits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<Box<Dataset>>,
}

impl Dataset {
    /// Creates an empty dataset with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Returns true if the dataset has a source file.
    pub fn has_file(&self) -> bool {
        self.file.is_some()
    }

    /// Returns the status meaning "needs full re-indexing".
    pub fn reindexer_status(&self) -> DatasetStatus {
        if self.has_file() {
            DatasetStatus::Validated
        } else {
            DatasetStatus::Analyzed
        }
    }

    /// Returns the status a failed dataset restarts from when the failing
    /// step is unknown.
    pub fn reset_status(&self) -> DatasetStatus {
        if self.is_virtual {
            DatasetStatus::Indexed
        } else if self.is_rest {
            DatasetStatus::Analyzed
        } else if self.remote_file.is_some() && !self.has_file() {
            DatasetStatus::Imported
        } else {
            DatasetStatus::Loaded
        }
    }

    /// Returns true if the last error was flagged as not retryable.
    pub fn error_is_final(&self) -> bool {
        self.error_message
            .as_deref()
            .is_some_and(|m| m.starts_with(NO_RETRY_PREFIX))
    }

    /// Returns true if the REST history flag for updater identity is set.
    pub fn stores_updated_by(&self) -> bool {
        self.is_rest && self.rest.as_ref().is_some_and(|r| r.store_updated_by)
    }

    /// Returns the estimated indexed size of one row in bytes.
    pub fn mean_row_size(&self) -> Option<u64> {
        let size = self.storage.as_ref()?.indexed.as_ref()?.size;
        let count = self.count.filter(|c| *c > 0)?;
        Some((size as f64 / count as f64).round() as u64)
    }

    /// Returns the dataset as seen through its draft, when one exists.
    ///
    /// Draft values override the published ones key by key.
    pub fn with_draft_applied(&self) -> crate::error::EngineResult<Dataset> {
        let Some(draft) = &self.draft else {
            return Ok(self.clone());
        };
        let mut base = serde_json::to_value(self)?;
        if let Some(obj) = base.as_object_mut() {
            obj.remove("draft");
        }
        let overlay = serde_json::to_value(draft.as_ref())?;
        if let (Some(base_obj), Value::Object(overlay_obj)) = (base.as_object_mut(), overlay) {
            for (key, value) in overlay_obj {
                if key == "id" {
                    continue;
                }
                base_obj.insert(key, value);
            }
        }
        Ok(serde_json::from_value(base)?)
    }

    /// Returns the field with the given key.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.schema.iter().find(|f| f.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(DatasetStatus::ValidationUpdated).unwrap(),
            json!("validation-updated")
        );
        let status: DatasetStatus = serde_json::from_value(json!("finalized")).unwrap();
        assert_eq!(status, DatasetStatus::Finalized);
        assert_eq!(status.to_string(), "finalized");
    }

    #[test]
    fn test_reindexer_status() {
        let mut dataset = Dataset::new("ds");
        assert_eq!(dataset.reindexer_status(), DatasetStatus::Analyzed);
        dataset.file = Some(FileInfo {
            name: "data.csv".to_string(),
            ..Default::default()
        });
        assert_eq!(dataset.reindexer_status(), DatasetStatus::Validated);
    }

    #[test]
    fn test_reset_status() {
        let mut dataset = Dataset::new("ds");
        dataset.is_virtual = true;
        assert_eq!(dataset.reset_status(), DatasetStatus::Indexed);

        let mut dataset = Dataset::new("ds");
        dataset.is_rest = true;
        assert_eq!(dataset.reset_status(), DatasetStatus::Analyzed);

        let mut dataset = Dataset::new("ds");
        dataset.remote_file = Some(RemoteFile {
            url: "https://example.com/data.csv".to_string(),
            ..Default::default()
        });
        assert_eq!(dataset.reset_status(), DatasetStatus::Imported);

        let dataset = Dataset::new("ds");
        assert_eq!(dataset.reset_status(), DatasetStatus::Loaded);
    }

    #[test]
    fn test_error_is_final() {
        let mut dataset = Dataset::new("ds");
        assert!(!dataset.error_is_final());
        dataset.error_message = Some("[noretry] invalid file encoding".to_string());
        assert!(dataset.error_is_final());
        dataset.error_message = Some("timeout".to_string());
        assert!(!dataset.error_is_final());
    }

    #[test]
    fn test_mean_row_size() {
        let mut dataset = Dataset::new("ds");
        assert_eq!(dataset.mean_row_size(), None);
        dataset.storage = Some(StorageInfo {
            indexed: Some(IndexedStorage { size: 1000 }),
        });
        dataset.count = Some(3);
        assert_eq!(dataset.mean_row_size(), Some(333));
        dataset.count = Some(0);
        assert_eq!(dataset.mean_row_size(), None);
    }

    #[test]
    fn test_with_draft_applied() {
        let mut dataset = Dataset::new("ds");
        dataset.title = Some("Published".to_string());
        dataset.status = DatasetStatus::Finalized;
        let mut draft = Dataset::new("");
        draft.title = Some("Draft".to_string());
        draft.status = DatasetStatus::Analyzed;
        dataset.draft = Some(Box::new(draft));

        let effective = dataset.with_draft_applied().unwrap();
        assert_eq!(effective.id, "ds");
        assert_eq!(effective.title.as_deref(), Some("Draft"));
        assert_eq!(effective.status, DatasetStatus::Analyzed);
        assert!(effective.draft.is_none());
    }

    #[test]
    fn test_dataset_deserializes_virtual_key() {
        let dataset: Dataset = serde_json::from_value(json!({
            "id": "v1",
            "isVirtual": true,
            "virtual": {"children": ["a", "b"]},
            "status": "indexed"
        }))
        .unwrap();
        assert_eq!(
            dataset.virtual_config.unwrap().children,
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
