//! Patches and the updates they resolve to.
//!
//! A [`DatasetPatch`] is what a caller asks for: a partial dataset. The
//! planner resolves it against the current dataset and produces a
//! [`DatasetUpdate`], the `$set`/`$unset` document the store applies
//! atomically.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::EngineResult;
use crate::types::dataset::{
    Dataset, Extension, FileInfo, Projection, Publication, RemoteFile, RestConfig, VirtualConfig,
};
use crate::types::field::Field;

/// Files uploaded alongside a patch.
///
/// Uploads never go through serialization: they are always "new" and are
/// never elided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uploads {
    /// A new data file.
    pub data_file: Option<FileInfo>,
    /// A new attachments bundle.
    pub attachments: Option<FileInfo>,
}

impl Uploads {
    /// Returns true if nothing was uploaded.
    pub fn is_empty(&self) -> bool {
        self.data_file.is_none() && self.attachments.is_none()
    }
}

/// A partial dataset describing the changes a caller wants.
///
/// Every field is optional: `None` means "leave unchanged". Nullable
/// attributes use `Option<Option<T>>` where `Some(None)` removes the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Vec<Field>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_file: Option<RemoteFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestConfig>,
    #[serde(rename = "virtual", default, skip_serializing_if = "Option::is_none")]
    pub virtual_config: Option<VirtualConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<Extension>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "nullable"
    )]
    pub projection: Option<Option<Projection>>,
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

    /// Uploaded files accompanying the patch.
    #[serde(skip)]
    pub uploads: Uploads,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl DatasetPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && *self == DatasetPatch::default()
    }

    /// Returns the wire keys of the attributes this patch touches.
    pub fn keys(&self) -> EngineResult<Vec<String>> {
        Ok(match serde_json::to_value(self)? {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    /// Drops every attribute whose value is deep-equal to the current one.
    ///
    /// An attribute missing from the dataset compares equal to `null`.
    pub fn elide_noops(&self, dataset: &Dataset) -> EngineResult<DatasetPatch> {
        let current = serde_json::to_value(dataset)?;
        let mut patch = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut patch {
            map.retain(|key, value| current.get(key).unwrap_or(&Value::Null) != value);
        }
        let mut elided: DatasetPatch = serde_json::from_value(patch)?;
        elided.uploads = self.uploads.clone();
        Ok(elided)
    }

    /// Returns the dataset with every attribute of this patch written over it.
    pub fn apply_to(&self, dataset: &Dataset) -> EngineResult<Dataset> {
        let mut merged = serde_json::to_value(dataset)?;
        if let (Some(target), Value::Object(changes)) =
            (merged.as_object_mut(), serde_json::to_value(self)?)
        {
            for (key, value) in changes {
                if value.is_null() {
                    target.remove(&key);
                } else {
                    target.insert(key, value);
                }
            }
        }
        Ok(serde_json::from_value(merged)?)
    }
}

/// An atomic `$set`/`$unset` update of a dataset document.
///
/// Keys are dotted paths (`draft.schema`, `rest.ttl`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetUpdate {
    /// Paths to overwrite.
    pub set: BTreeMap<String, Value>,
    /// Paths to remove.
    pub unset: BTreeSet<String>,
}

impl DatasetUpdate {
    /// Returns true if the update writes nothing.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Writes a value; `null` becomes an unset.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.set.remove(&key);
            self.unset.insert(key);
        } else {
            self.unset.remove(&key);
            self.set.insert(key, value);
        }
    }

    /// Removes a path.
    pub fn remove(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.set.remove(&key);
        self.unset.insert(key);
    }

    /// Returns the same update with every path prefixed.
    pub fn prefixed(self, prefix: &str) -> DatasetUpdate {
        DatasetUpdate {
            set: self
                .set
                .into_iter()
                .map(|(k, v)| (format!("{}.{}", prefix, k), v))
                .collect(),
            unset: self
                .unset
                .into_iter()
                .map(|k| format!("{}.{}", prefix, k))
                .collect(),
        }
    }

    /// Applies the update to a JSON document.
    ///
    /// Set paths replace the previous value wholesale, the same way a
    /// document store `$set` does.
    pub fn apply_to(&self, document: &mut Value) {
        for key in &self.unset {
            json_patch::merge(document, &nested(key, Value::Null));
        }
        for (key, value) in &self.set {
            json_patch::merge(document, &nested(key, Value::Null));
            json_patch::merge(document, &nested(key, value.clone()));
        }
    }
}

fn nested(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, segment| {
        let mut map = serde_json::Map::new();
        map.insert(segment.to_string(), inner);
        Value::Object(map)
    })
}
