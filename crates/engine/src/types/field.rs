//! The field model: one column of a dataset schema.
//!
//! Fields serialize in the JSON-schema dialect used by dataset documents:
//! standard keywords (`type`, `format`, `title`, `minimum`, ...) plus
//! `x-` prefixed extension keywords for system semantics.
//!
//! Attributes fall in four groups:
//!
//! | Group | Attributes | Effect of a change |
//! |-------|------------|--------------------|
//! | Structural | `key`, `type`, `format`, `x-calculated`, `x-extension`, `x-refersTo`, `x-capabilities`, parsing hints | May require reprocessing |
//! | Cosmetic | `title`, `description`, `icon`, `x-display`, `x-master`, `x-labels`, `x-group`, `x-cardinality`, `readOnly`, `enum`, `x-originalName`, `x-concept` | Never requires reprocessing |
//! | Transform | `x-transform` | Re-analyzes datasets with a source file |
//! | Validation | `x-required`, `minimum`, `maximum`, `minLength`, `maxLength`, `pattern`, `x-labelsRestricted` | May require re-validation only |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Primitive type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text, dates and URIs (refined by `format`).
    #[default]
    String,
    /// Whole numbers.
    Integer,
    /// Floating point numbers.
    Number,
    /// Booleans.
    Boolean,
    /// Nested objects (e.g. GeoJSON shapes).
    Object,
    /// Arrays (e.g. bounding corners).
    Array,
}

impl FieldType {
    /// Returns the JSON-schema name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The resolved vocabulary concept of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptRef {
    /// Concept identifier in its vocabulary.
    pub id: String,
    /// Concept title.
    pub title: String,
    /// Whether the concept is the field's primary annotation.
    #[serde(default)]
    pub primary: bool,
}

/// Query features enabled on a field.
///
/// Every flag is optional; `None` means the default for that capability.
/// Most capabilities are enabled by default, `wildcard` and `textAgg` are
/// opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_standard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insensitive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wildcard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_agg: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_shape: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_corners: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_attachment: Option<bool>,
}

impl Capabilities {
    /// Returns true if no capability is explicitly set.
    pub fn is_default(&self) -> bool {
        *self == Capabilities::default()
    }

    pub fn index(&self) -> bool {
        self.index != Some(false)
    }

    pub fn values(&self) -> bool {
        self.values != Some(false)
    }

    pub fn text_standard(&self) -> bool {
        self.text_standard != Some(false)
    }

    pub fn text(&self) -> bool {
        self.text != Some(false)
    }

    pub fn insensitive(&self) -> bool {
        self.insensitive != Some(false)
    }

    pub fn wildcard(&self) -> bool {
        self.wildcard == Some(true)
    }

    pub fn text_agg(&self) -> bool {
        self.text_agg == Some(true)
    }

    pub fn geo_shape(&self) -> bool {
        self.geo_shape != Some(false)
    }

    pub fn geo_corners(&self) -> bool {
        self.geo_corners != Some(false)
    }

    pub fn index_attachment(&self) -> bool {
        self.index_attachment != Some(false)
    }
}

/// Validation attributes of a field, compared as a unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationRules {
    pub required: Option<bool>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub pattern: Option<String>,
    pub labels_restricted: Option<bool>,
}

impl ValidationRules {
    /// Returns true if at least one rule is active.
    pub fn any(&self) -> bool {
        self.required.unwrap_or(false)
            || self.minimum.is_some()
            || self.maximum.is_some()
            || self.min_length.is_some()
            || self.max_length.is_some()
            || self.pattern.is_some()
            || self.labels_restricted.unwrap_or(false)
    }
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

/// One schema column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Field {
    /// Unique key within the schema.
    pub key: String,

    /// Primitive type.
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Refinement of the type (`date`, `date-time`, `uri-reference`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// System-derived, never user-editable.
    #[serde(rename = "x-calculated", default, skip_serializing_if = "is_false")]
    pub calculated: bool,

    /// Id of the extension that produced this field.
    #[serde(rename = "x-extension", default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,

    /// Semantic annotation requested by the owner (a concept URI).
    #[serde(rename = "x-refersTo", default, skip_serializing_if = "Option::is_none")]
    pub refers_to: Option<String>,

    /// Concept the annotation resolved to.
    #[serde(rename = "x-concept", default, skip_serializing_if = "Option::is_none")]
    pub concept: Option<ConceptRef>,

    /// Enabled query features.
    #[serde(
        rename = "x-capabilities",
        default,
        skip_serializing_if = "Capabilities::is_default"
    )]
    pub capabilities: Capabilities,

    /// Separator of multi-valued cells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,

    /// Time zone used to interpret naive date-times.
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    /// Disables type detection, the column stays a string.
    #[serde(rename = "ignoreDetection", default, skip_serializing_if = "is_false")]
    pub ignore_detection: bool,

    /// Disables integer detection, numbers stay floats.
    #[serde(
        rename = "ignoreIntegerDetection",
        default,
        skip_serializing_if = "is_false"
    )]
    pub ignore_integer_detection: bool,

    // cosmetic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "x-display", default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(rename = "x-master", default, skip_serializing_if = "Option::is_none")]
    pub master: Option<Value>,
    #[serde(rename = "x-labels", default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(rename = "x-group", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(rename = "x-cardinality", default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<u64>,
    #[serde(rename = "readOnly", default, skip_serializing_if = "is_false")]
    pub read_only: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<Vec<Value>>,
    #[serde(rename = "x-originalName", default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(rename = "x-transform", default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Value>,

    // validation
    #[serde(rename = "x-required", default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(rename = "minLength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u64>,
    #[serde(rename = "maxLength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(
        rename = "x-labelsRestricted",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub labels_restricted: Option<bool>,

    /// Attributes without a dedicated member, kept as written.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Field {
    /// Creates a field with the given key and type.
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            ..Default::default()
        }
    }

    /// Creates a calculated field.
    pub fn calculated(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            calculated: true,
            ..Self::new(key, field_type)
        }
    }

    /// Sets the format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets the concept annotation URI.
    pub fn with_refers_to(mut self, uri: impl Into<String>) -> Self {
        self.refers_to = Some(uri.into());
        self
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Marks the field as produced by an extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    /// Sets the capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Returns true if the field is extension-owned.
    pub fn is_extension(&self) -> bool {
        self.extension.is_some()
    }

    /// Returns true if the field is system-derived and not owned by an extension.
    pub fn is_system(&self) -> bool {
        self.calculated && !self.is_extension()
    }

    /// Returns the format that matters for query results.
    ///
    /// `uri-reference` is the implicit format of plain strings, so it is
    /// treated the same as no format at all.
    pub fn effective_format(&self) -> Option<&str> {
        match self.format.as_deref() {
            None | Some("uri-reference") => None,
            Some(f) => Some(f),
        }
    }

    /// Returns true for date and date-time fields.
    pub fn is_date(&self) -> bool {
        self.field_type == FieldType::String
            && matches!(self.format.as_deref(), Some("date") | Some("date-time"))
    }

    /// Returns the validation attributes of the field.
    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            required: self.required,
            minimum: self.minimum,
            maximum: self.maximum,
            min_length: self.min_length,
            max_length: self.max_length,
            pattern: self.pattern.clone(),
            labels_restricted: self.labels_restricted,
        }
    }

    /// Returns a copy with every cosmetic and validation attribute cleared.
    pub fn structural(&self) -> Field {
        Field {
            key: self.key.clone(),
            field_type: self.field_type,
            format: self.format.clone(),
            calculated: self.calculated,
            extension: self.extension.clone(),
            refers_to: self.refers_to.clone(),
            concept: None,
            capabilities: self.capabilities,
            separator: self.separator.clone(),
            time_zone: self.time_zone.clone(),
            ignore_detection: self.ignore_detection,
            ignore_integer_detection: self.ignore_integer_detection,
            ..Default::default()
        }
    }

    /// Returns the column header used in tabular exports.
    pub fn header(&self) -> &str {
        self.original_name.as_deref().unwrap_or(&self.key)
    }
}
