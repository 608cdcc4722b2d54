//! Cursor pagination for result pages.
//!
//! Pages are addressed by the sort values of the last row returned rather
//! than by an offset, so a page boundary stays put while rows are inserted
//! or removed concurrently.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// An opaque cursor for fetching the next page.
///
/// # Encoding
///
/// Cursors are base64-encoded JSON containing:
/// - Sort key values for the last returned row
/// - The row id for tie-breaking
/// - Version information for cursor compatibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Cursor format version.
    version: u8,

    /// The sort key values at the cursor position.
    sort_values: Vec<CursorValue>,

    /// The row id at the cursor position.
    row_id: String,
}

/// A value in the cursor for sorting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    /// String value.
    String(String),
    /// Numeric value.
    Number(i64),
    /// Decimal value.
    Decimal(f64),
    /// Boolean value.
    Boolean(bool),
    /// Null value.
    Null,
}

impl PageCursor {
    /// Creates a new cursor at the given position.
    pub fn new(sort_values: Vec<CursorValue>, row_id: impl Into<String>) -> Self {
        Self {
            version: 1,
            sort_values,
            row_id: row_id.into(),
        }
    }

    /// Creates a cursor from the raw sort values of a search hit.
    pub fn from_hit_sort(sort: &[Value], row_id: impl Into<String>) -> Self {
        Self::new(sort.iter().map(CursorValue::from).collect(), row_id)
    }

    /// Returns the sort values.
    pub fn sort_values(&self) -> &[CursorValue] {
        &self.sort_values
    }

    /// Returns the sort values as JSON, ready for a search-after query.
    pub fn search_after(&self) -> Vec<Value> {
        self.sort_values.iter().map(Value::from).collect()
    }

    /// Returns the row id.
    pub fn row_id(&self) -> &str {
        &self.row_id
    }

    /// Encodes the cursor to an opaque string.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(&json)
    }

    /// Decodes a cursor from an opaque string.
    pub fn decode(s: &str) -> Result<Self, ValidationError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|_| ValidationError::InvalidCursor {
                cursor: s.to_string(),
            })?;

        serde_json::from_slice(&bytes).map_err(|_| ValidationError::InvalidCursor {
            cursor: s.to_string(),
        })
    }
}

impl From<&Value> for CursorValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => CursorValue::String(s.clone()),
            Value::Bool(b) => CursorValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => CursorValue::Number(i),
                None => CursorValue::Decimal(n.as_f64().unwrap_or_default()),
            },
            // composite sort values do not occur in practice, keep them as text
            Value::Array(_) | Value::Object(_) => CursorValue::String(value.to_string()),
            Value::Null => CursorValue::Null,
        }
    }
}

impl From<&CursorValue> for Value {
    fn from(value: &CursorValue) -> Self {
        match value {
            CursorValue::String(s) => Value::String(s.clone()),
            CursorValue::Number(n) => Value::from(*n),
            CursorValue::Decimal(d) => Value::from(*d),
            CursorValue::Boolean(b) => Value::Bool(*b),
            CursorValue::Null => Value::Null,
        }
    }
}

impl From<&str> for CursorValue {
    fn from(s: &str) -> Self {
        CursorValue::String(s.to_string())
    }
}

impl From<i64> for CursorValue {
    fn from(n: i64) -> Self {
        CursorValue::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cursor_encode_decode() {
        let cursor = PageCursor::new(vec![CursorValue::from(42i64), CursorValue::from("b")], "row-9");
        let encoded = cursor.encode();
        assert!(!encoded.contains('='));
        let decoded = PageCursor::decode(&encoded).unwrap();
        assert_eq!(decoded, cursor);
        assert_eq!(decoded.row_id(), "row-9");
    }

    #[test]
    fn test_cursor_from_hit_sort() {
        let cursor = PageCursor::from_hit_sort(&[json!(3), json!(0.5), json!("x"), json!(null)], "r");
        assert_eq!(
            cursor.sort_values(),
            &[
                CursorValue::Number(3),
                CursorValue::Decimal(0.5),
                CursorValue::String("x".to_string()),
                CursorValue::Null
            ]
        );
        assert_eq!(cursor.search_after(), vec![json!(3), json!(0.5), json!("x"), json!(null)]);
    }

    #[test]
    fn test_cursor_decode_invalid() {
        let err = PageCursor::decode("not a cursor!").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCursor { .. }));

        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(PageCursor::decode(&not_json).is_err());
    }
}
