//! CSV rendering of search hits.
//!
//! Output starts with a UTF-8 byte order mark so that spreadsheet software
//! detects the encoding. Booleans are written `1`/`0` and NUL characters are
//! stripped.

use bytes::Bytes;
use csv::{QuoteStyle, WriterBuilder};
use serde_json::{Map, Value};

use crate::error::EngineResult;
use crate::types::{Dataset, Field, SearchHit};

const BOM: &str = "\u{feff}";

/// Options of the CSV writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Write the header line.
    pub header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header: true,
        }
    }
}

/// Returns the exported columns: the selected fields, or every field the
/// owner declared.
pub fn columns<'a>(dataset: &'a Dataset, select: Option<&[String]>) -> Vec<&'a Field> {
    match select {
        Some(keys) if !keys.is_empty() => keys.iter().filter_map(|k| dataset.field(k)).collect(),
        _ => dataset.schema.iter().filter(|f| !f.calculated).collect(),
    }
}

fn write_record<I>(record: I, options: CsvOptions) -> EngineResult<Vec<u8>>
where
    I: IntoIterator<Item = String>,
{
    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(Vec::new());
    writer.write_record(record)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}

/// Returns the byte order mark followed by the header line, when enabled.
pub fn header_chunk(columns: &[&Field], options: CsvOptions) -> EngineResult<Bytes> {
    let mut chunk = BOM.as_bytes().to_vec();
    if options.header {
        chunk.extend(write_record(
            columns.iter().map(|f| f.header().to_string()),
            options,
        )?);
    }
    Ok(Bytes::from(chunk))
}

/// Returns the line of one hit.
pub fn row_chunk(columns: &[&Field], hit: &SearchHit, options: CsvOptions) -> EngineResult<Bytes> {
    let record = columns.iter().map(|field| cell(field, &hit.source));
    Ok(Bytes::from(write_record(record, options)?))
}

/// Renders a whole page.
pub fn hits_to_csv(columns: &[&Field], hits: &[SearchHit], options: CsvOptions) -> EngineResult<Bytes> {
    let mut out = header_chunk(columns, options)?.to_vec();
    for hit in hits {
        out.extend_from_slice(&row_chunk(columns, hit, options)?);
    }
    Ok(Bytes::from(out))
}

fn cell(field: &Field, source: &Map<String, Value>) -> String {
    let text = match source.get(&field.key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::Bool(true)) => "1".to_string(),
        Some(Value::Bool(false)) => "0".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => {
            let separator = field.separator.as_deref().unwrap_or(", ");
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(separator)
        }
        Some(other @ Value::Object(_)) => other.to_string(),
    };
    text.replace('\0', "")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::FieldType;

    fn dataset() -> Dataset {
        let mut dataset = Dataset::new("ds");
        let mut label = Field::new("label", FieldType::String);
        label.original_name = Some("Label".to_string());
        let mut tags = Field::new("tags", FieldType::String);
        tags.separator = Some(";".to_string());
        dataset.schema = vec![
            label,
            Field::new("open", FieldType::Boolean),
            Field::new("count", FieldType::Integer),
            tags,
            Field::calculated("_id", FieldType::String),
        ];
        dataset
    }

    fn hit(source: Value) -> SearchHit {
        SearchHit {
            id: "1".to_string(),
            source: source.as_object().cloned().unwrap_or_default(),
            sort: Vec::new(),
        }
    }

    #[test]
    fn test_calculated_fields_are_not_exported() {
        let dataset = dataset();
        let keys: Vec<&str> = columns(&dataset, None).iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["label", "open", "count", "tags"]);
        let selected = vec!["count".to_string(), "unknown".to_string()];
        assert_eq!(columns(&dataset, Some(selected.as_slice())).len(), 1);
    }

    #[test]
    fn test_page_rendering() {
        let dataset = dataset();
        let columns = columns(&dataset, None);
        let hits = vec![
            hit(json!({"label": "a\0b", "open": true, "count": 3, "tags": ["x", "y"]})),
            hit(json!({"label": "c", "open": false})),
        ];
        let csv = hits_to_csv(&columns, &hits, CsvOptions::default()).unwrap();
        let text = String::from_utf8(csv.to_vec()).unwrap();
        assert_eq!(
            text,
            "\u{feff}\"Label\",\"open\",\"count\",\"tags\"\n\"ab\",1,3,\"x;y\"\n\"c\",0,\"\",\"\"\n"
        );
    }

    #[test]
    fn test_custom_delimiter_without_header() {
        let dataset = dataset();
        let selected = vec!["label".to_string(), "count".to_string()];
        let columns = columns(&dataset, Some(selected.as_slice()));
        let options = CsvOptions {
            delimiter: b';',
            header: false,
        };
        let csv = hits_to_csv(&columns, &[hit(json!({"label": "x", "count": 2}))], options).unwrap();
        assert_eq!(&csv[..], "\u{feff}\"x\";2\n".as_bytes());
    }
}
