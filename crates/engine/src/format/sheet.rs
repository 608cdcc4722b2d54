//! Spreadsheet exports.
//!
//! Both formats are zip archives of XML parts. Rows are written one by one
//! into the worksheet part; strings are stored inline so no shared string
//! table has to be kept in memory. The archive is written in streaming mode
//! and drained in chunks as pages of rows arrive.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::{SimpleFileOptions, StreamWriter};

use crate::error::EngineResult;
use crate::types::{Field, SearchHit};

/// Spreadsheet flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetKind {
    Xlsx,
    Ods,
}

impl SheetKind {
    pub fn content_type(&self) -> &'static str {
        match self {
            SheetKind::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            SheetKind::Ods => ODS_MIMETYPE,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SheetKind::Xlsx => "xlsx",
            SheetKind::Ods => "ods",
        }
    }
}

const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const XLSX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#;

const XLSX_ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const XLSX_WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#;

const ODS_MANIFEST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2"><manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/><manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/></manifest:manifest>"#;

/// A cell value.
enum Cell {
    Text(String),
    Number(String),
    Empty,
}

fn cell(field: &Field, hit: &SearchHit) -> Cell {
    match hit.source.get(&field.key) {
        None | Some(Value::Null) => Cell::Empty,
        Some(Value::Number(n)) => Cell::Number(n.to_string()),
        Some(Value::Bool(b)) => Cell::Text(if *b { "1" } else { "0" }.to_string()),
        Some(Value::String(s)) => Cell::Text(s.clone()),
        Some(Value::Array(items)) => {
            let separator = field.separator.as_deref().unwrap_or(", ");
            let parts: Vec<String> = items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect();
            Cell::Text(parts.join(separator))
        }
        Some(other) => Cell::Text(other.to_string()),
    }
}

/// Escapes text for XML content and attributes. Control characters XML 1.0
/// forbids are dropped.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c < ' ' => {}
            c => out.push(c),
        }
    }
    out
}

/// In-memory sink of the zip writer. Written bytes are drained as chunks.
#[derive(Debug, Clone, Default)]
struct ChunkBuffer(Arc<Mutex<Vec<u8>>>);

impl ChunkBuffer {
    fn take(&self) -> Bytes {
        Bytes::from(std::mem::take(&mut *self.0.lock()))
    }
}

impl Write for ChunkBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Incremental spreadsheet writer.
///
/// The archive is written in streaming mode: no part is ever rewritten, so
/// every chunk returned by [`SheetWriter::take_chunk`] is final and can be
/// sent while later rows are still being fetched. Only the rows of the
/// current page and the compressor window are held in memory.
pub struct SheetWriter<'a> {
    kind: SheetKind,
    columns: Vec<&'a Field>,
    zip: ZipWriter<StreamWriter<ChunkBuffer>>,
    buffer: ChunkBuffer,
    rows: u64,
}

impl fmt::Debug for SheetWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetWriter")
            .field("kind", &self.kind)
            .field("columns", &self.columns.len())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl<'a> SheetWriter<'a> {
    /// Writes the fixed parts of the archive and the header row.
    pub fn new(kind: SheetKind, columns: Vec<&'a Field>) -> EngineResult<Self> {
        let buffer = ChunkBuffer::default();
        let mut zip = ZipWriter::new_stream(buffer.clone());
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        match kind {
            SheetKind::Xlsx => {
                zip.start_file("[Content_Types].xml", deflated)?;
                zip.write_all(XLSX_CONTENT_TYPES.as_bytes())?;
                zip.start_file("_rels/.rels", deflated)?;
                zip.write_all(XLSX_ROOT_RELS.as_bytes())?;
                zip.start_file("xl/workbook.xml", deflated)?;
                zip.write_all(xlsx_workbook().as_bytes())?;
                zip.start_file("xl/_rels/workbook.xml.rels", deflated)?;
                zip.write_all(XLSX_WORKBOOK_RELS.as_bytes())?;

                zip.start_file("xl/worksheets/sheet1.xml", deflated)?;
                zip.write_all(
                    br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
                )?;
            }
            SheetKind::Ods => {
                // readers sniff the format from an uncompressed first entry
                let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
                zip.start_file("mimetype", stored)?;
                zip.write_all(ODS_MIMETYPE.as_bytes())?;
                zip.start_file("META-INF/manifest.xml", deflated)?;
                zip.write_all(ODS_MANIFEST.as_bytes())?;

                zip.start_file("content.xml", deflated)?;
                zip.write_all(
                    br#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" office:version="1.2"><office:body><office:spreadsheet><table:table table:name="Data">"#,
                )?;
            }
        }

        let mut writer = Self {
            kind,
            columns,
            zip,
            buffer,
            rows: 0,
        };
        let header: Vec<Cell> = writer
            .columns
            .iter()
            .map(|f| Cell::Text(f.header().to_string()))
            .collect();
        writer.write_cells(&header)?;
        Ok(writer)
    }

    fn write_cells(&mut self, cells: &[Cell]) -> EngineResult<()> {
        let row = match self.kind {
            SheetKind::Xlsx => xlsx_row(cells),
            SheetKind::Ods => ods_row(cells),
        };
        self.zip.write_all(row.as_bytes())?;
        Ok(())
    }

    /// Appends one row per hit and flushes the compressor, so the rows are
    /// part of the next chunk.
    pub fn write_rows<'h, I>(&mut self, hits: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = &'h SearchHit>,
    {
        for hit in hits {
            let row: Vec<Cell> = self.columns.iter().map(|f| cell(f, hit)).collect();
            self.write_cells(&row)?;
            self.rows += 1;
        }
        self.zip.flush()?;
        Ok(())
    }

    /// Number of data rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Returns the bytes written since the previous call.
    pub fn take_chunk(&self) -> Bytes {
        self.buffer.take()
    }

    /// Closes the sheet and the archive and returns the last chunk.
    pub fn finish(mut self) -> EngineResult<Bytes> {
        let closing: &[u8] = match self.kind {
            SheetKind::Xlsx => b"</sheetData></worksheet>",
            SheetKind::Ods => b"</table:table></office:spreadsheet></office:body></office:document-content>",
        };
        self.zip.write_all(closing)?;
        self.zip.finish()?;
        Ok(self.buffer.take())
    }
}

/// Writes a spreadsheet with a header row and one row per hit, in one piece.
pub fn write_sheet<'a, I>(kind: SheetKind, columns: &[&Field], hits: I) -> EngineResult<Bytes>
where
    I: IntoIterator<Item = &'a SearchHit>,
{
    let mut writer = SheetWriter::new(kind, columns.to_vec())?;
    writer.write_rows(hits)?;
    let mut out = writer.take_chunk().to_vec();
    out.extend_from_slice(&writer.finish()?);
    Ok(Bytes::from(out))
}

fn xlsx_workbook() -> String {
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Data" sheetId="1" r:id="rId1"/></sheets></workbook>"#
        .to_string()
}

fn xlsx_row(cells: &[Cell]) -> String {
    let mut row = String::from("<row>");
    for cell in cells {
        match cell {
            Cell::Text(text) => {
                row.push_str(r#"<c t="inlineStr"><is><t xml:space="preserve">"#);
                row.push_str(&escape(text));
                row.push_str("</t></is></c>");
            }
            Cell::Number(n) => {
                row.push_str("<c><v>");
                row.push_str(n);
                row.push_str("</v></c>");
            }
            Cell::Empty => row.push_str("<c/>"),
        }
    }
    row.push_str("</row>");
    row
}

fn ods_row(cells: &[Cell]) -> String {
    let mut row = String::from("<table:table-row>");
    for cell in cells {
        match cell {
            Cell::Text(text) => {
                row.push_str(r#"<table:table-cell office:value-type="string"><text:p>"#);
                row.push_str(&escape(text));
                row.push_str("</text:p></table:table-cell>");
            }
            Cell::Number(n) => {
                row.push_str(&format!(
                    r#"<table:table-cell office:value-type="float" office:value="{}"><text:p>{}</text:p></table:table-cell>"#,
                    n, n
                ));
            }
            Cell::Empty => row.push_str("<table:table-cell/>"),
        }
    }
    row.push_str("</table:table-row>");
    row
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use serde_json::json;
    use zip::ZipArchive;

    use super::*;
    use crate::types::FieldType;

    fn fixture() -> (Vec<Field>, Vec<SearchHit>) {
        let fields = vec![
            Field::new("name", FieldType::String),
            Field::new("count", FieldType::Integer),
        ];
        let hits = vec![SearchHit {
            id: "1".to_string(),
            source: json!({"name": "Fish & <Chips>", "count": 4})
                .as_object()
                .cloned()
                .unwrap(),
            sort: Vec::new(),
        }];
        (fields, hits)
    }

    fn entry(bytes: &Bytes, name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut text = String::new();
        file.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_xlsx_inline_strings() {
        let (fields, hits) = fixture();
        let columns: Vec<&Field> = fields.iter().collect();
        let bytes = write_sheet(SheetKind::Xlsx, &columns, &hits).unwrap();
        let sheet = entry(&bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"<c t="inlineStr"><is><t xml:space="preserve">Fish &amp; &lt;Chips&gt;</t></is></c>"#));
        assert!(sheet.contains("<c><v>4</v></c>"));
        assert!(entry(&bytes, "[Content_Types].xml").contains("sheet1.xml"));
    }

    #[test]
    fn test_ods_mimetype_first_and_stored() {
        let (fields, hits) = fixture();
        let columns: Vec<&Field> = fields.iter().collect();
        let bytes = write_sheet(SheetKind::Ods, &columns, &hits).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);
        assert!(entry(&bytes, "content.xml").contains(r#"office:value="4""#));
    }
}
