//! Rendering of dataset rows.
//!
//! [`ResultFormatter`] runs searches and renders the hits in the requested
//! [`OutputFormat`]. Only datasets in a readable status are served.
//!
//! | Format | Module | Output |
//! |--------|--------|--------|
//! | `json` | [`json`] | one page with a cursor link to the next one |
//! | `csv` | [`csv`] | one page, or a lazy stream over the whole dataset |
//! | `xlsx`, `ods` | [`sheet`] | one page, or a chunked archive of the whole dataset |
//! | `geojson` | [`geojson`] | a FeatureCollection with a bbox |
//! | `wkt` | [`wkt`] | a geometry collection |
//! | `mvt` | [`crate::tiles::mvt`] | a sampled and cached vector tile |

pub mod csv;
pub mod geojson;
pub mod json;
pub mod sheet;
pub mod wkt;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheKey, ResultCache, SearchTileCounter, ServedFrom};
use crate::config::EngineConfig;
use crate::core::SearchEngine;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::tiles::mvt::encode_tile;
use crate::tiles::{AdaptiveTileSampler, SamplingDecision, TileCoord};
use crate::types::{
    Dataset, PageCursor, SamplingMode, SearchHit, SearchQuery, SortField, TileRequest,
};

pub use self::csv::CsvOptions;
pub use self::sheet::{SheetKind, SheetWriter};

/// Requested output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Xlsx,
    Ods,
    GeoJson,
    Wkt,
    Mvt,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Ods => "ods",
            OutputFormat::GeoJson => "geojson",
            OutputFormat::Wkt => "wkt",
            OutputFormat::Mvt => "mvt",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "xlsx" => Ok(OutputFormat::Xlsx),
            "ods" => Ok(OutputFormat::Ods),
            "geojson" => Ok(OutputFormat::GeoJson),
            "wkt" => Ok(OutputFormat::Wkt),
            "mvt" | "vt" | "pbf" => Ok(OutputFormat::Mvt),
            _ => Err(ValidationError::InvalidFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// A read request on the rows of a dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinesQuery {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// Restricts to a tile; required by `mvt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile: Option<TileCoord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortField>,
    /// Page size, the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Cursor of the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default)]
    pub sampling: SamplingMode,
    /// CSV delimiter, `,` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sep: Option<char>,
    /// Omit the CSV header line.
    #[serde(default)]
    pub no_header: bool,
}

impl LinesQuery {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    /// Returns the query parameters carried over to the next page link.
    pub fn link_params(&self, size: u64) -> Vec<(String, String)> {
        let mut params = vec![("size".to_string(), size.to_string())];
        if self.format != OutputFormat::Json {
            params.push(("format".to_string(), self.format.to_string()));
        }
        for (key, value) in &self.filters {
            params.push((format!("{}_eq", key), value.clone()));
        }
        if let Some(q) = &self.q {
            params.push(("q".to_string(), q.clone()));
        }
        if let Some(bbox) = &self.bbox {
            let bbox: Vec<String> = bbox.iter().map(f64::to_string).collect();
            params.push(("bbox".to_string(), bbox.join(",")));
        }
        if let Some(select) = &self.select {
            params.push(("select".to_string(), select.join(",")));
        }
        if !self.sort.is_empty() {
            let sort: Vec<String> = self
                .sort
                .iter()
                .map(|s| {
                    if s.descending {
                        format!("-{}", s.key)
                    } else {
                        s.key.clone()
                    }
                })
                .collect();
            params.push(("sort".to_string(), sort.join(",")));
        }
        params
    }

    fn csv_options(&self) -> CsvOptions {
        let delimiter = self
            .sep
            .filter(char::is_ascii)
            .map_or(b',', |c| c as u8);
        CsvOptions {
            delimiter,
            header: !self.no_header,
        }
    }
}

/// An encoded vector tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutput {
    pub bytes: Bytes,
    pub source: ServedFrom,
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq)]
pub enum FormattedOutput {
    Json(Value),
    Csv(Bytes),
    Sheet { kind: SheetKind, bytes: Bytes },
    GeoJson(Value),
    Wkt(String),
    Tile(TileOutput),
    /// An empty tile.
    NoContent,
}

impl FormattedOutput {
    pub fn content_type(&self) -> &'static str {
        match self {
            FormattedOutput::Json(_) => "application/json",
            FormattedOutput::Csv(_) => "text/csv",
            FormattedOutput::Sheet { kind, .. } => kind.content_type(),
            FormattedOutput::GeoJson(_) => "application/geo+json",
            FormattedOutput::Wkt(_) => "text/plain",
            FormattedOutput::Tile(_) | FormattedOutput::NoContent => {
                "application/x-protobuf"
            }
        }
    }
}

fn ensure_readable(dataset: &Dataset) -> EngineResult<()> {
    if dataset.status.is_readable() {
        Ok(())
    } else {
        Err(ValidationError::DatasetNotReady {
            id: dataset.id.clone(),
            status: dataset.status.to_string(),
        }
        .into())
    }
}

/// Runs searches and renders their hits.
#[derive(Clone)]
pub struct ResultFormatter {
    search: Arc<dyn SearchEngine>,
    cache: ResultCache,
    config: EngineConfig,
    sampler: AdaptiveTileSampler,
}

impl fmt::Debug for ResultFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultFormatter")
            .field("search", &self.search.backend_name())
            .field("cache", &self.cache)
            .field("sampler", &self.sampler)
            .finish_non_exhaustive()
    }
}

impl ResultFormatter {
    pub fn new(search: Arc<dyn SearchEngine>, cache: ResultCache, config: EngineConfig) -> Self {
        let sampler = AdaptiveTileSampler::new(config.sampling.clone());
        Self {
            search,
            cache,
            config,
            sampler,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn page_size(&self, query: &LinesQuery) -> u64 {
        let pagination = &self.config.pagination;
        query
            .size
            .unwrap_or(pagination.default_size)
            .min(pagination.max_size)
    }

    fn search_query(&self, query: &LinesQuery, size: u64) -> EngineResult<SearchQuery> {
        let after = match &query.after {
            Some(cursor) => Some(PageCursor::decode(cursor)?.search_after()),
            None => None,
        };
        Ok(SearchQuery {
            filters: query.filters.clone(),
            q: query.q.clone(),
            tile: query.tile,
            bbox: query.bbox,
            select: query.select.clone(),
            sort: query.sort.clone(),
            size,
            after,
        })
    }

    /// Reads one page of rows, or one tile for `mvt`.
    pub async fn read_lines(
        &self,
        dataset: &Dataset,
        query: &LinesQuery,
    ) -> EngineResult<FormattedOutput> {
        ensure_readable(dataset)?;

        if query.format == OutputFormat::Mvt {
            let coord = query.tile.ok_or_else(|| ValidationError::InvalidTile {
                input: "missing tile coordinates".to_string(),
            })?;
            let size = query.size.unwrap_or(self.config.sampling.default_tile_size);
            let request = TileRequest {
                dataset_id: dataset.id.clone(),
                coord,
                filters: query.filters.clone(),
                q: query.q.clone(),
                size,
                select: query.select.clone(),
                sort: query.sort.clone(),
                sampling: query.sampling,
            };
            return self.tile(dataset, &request).await;
        }

        let size = self.page_size(query);
        let search_query = self.search_query(query, size)?;
        let response = self.search.search(dataset, &search_query).await?;
        debug!(
            dataset_id = %dataset.id,
            format = %query.format,
            total = response.total,
            hits = response.hits.len(),
            "Read lines"
        );

        Ok(match query.format {
            OutputFormat::Json => {
                let next = match json::next_cursor(&response, size) {
                    Some(cursor) => Some(json::next_link(
                        &self.config.public_url,
                        &dataset.id,
                        &query.link_params(size),
                        &cursor,
                    )?),
                    None => None,
                };
                FormattedOutput::Json(json::page(&response, next))
            }
            OutputFormat::Csv => {
                let columns = csv::columns(dataset, query.select.as_deref());
                FormattedOutput::Csv(csv::hits_to_csv(
                    &columns,
                    &response.hits,
                    query.csv_options(),
                )?)
            }
            OutputFormat::Xlsx | OutputFormat::Ods => {
                let kind = sheet_kind(query.format);
                let columns = csv::columns(dataset, query.select.as_deref());
                FormattedOutput::Sheet {
                    kind,
                    bytes: sheet::write_sheet(kind, &columns, &response.hits)?,
                }
            }
            OutputFormat::GeoJson => FormattedOutput::GeoJson(geojson::feature_collection(&response)),
            OutputFormat::Wkt => {
                FormattedOutput::Wkt(wkt::collection_to_wkt(&geojson::feature_collection(&response)))
            }
            OutputFormat::Mvt => FormattedOutput::NoContent,
        })
    }

    /// Serves a vector tile, from the cache when possible.
    ///
    /// Dense tiles are sampled by the density of their neighbors unless the
    /// request asks for [`SamplingMode::Max`].
    pub async fn tile(&self, dataset: &Dataset, request: &TileRequest) -> EngineResult<FormattedOutput> {
        ensure_readable(dataset)?;
        let key = CacheKey::tile(dataset, request);
        let (bytes, source) = self
            .cache
            .get_or_compute(&key, || self.render_tile(dataset, request))
            .await?;
        if bytes.is_empty() {
            return Ok(FormattedOutput::NoContent);
        }
        Ok(FormattedOutput::Tile(TileOutput { bytes, source }))
    }

    async fn render_tile(&self, dataset: &Dataset, request: &TileRequest) -> EngineResult<Bytes> {
        let mut query = request.search_query();

        if request.sampling == SamplingMode::Neighbors {
            let counter = SearchTileCounter::new(self.search.as_ref(), dataset, &query)
                .with_cache(&self.cache);
            let decision = self
                .sampler
                .sample(request.coord, request.size, dataset.mean_row_size(), &counter)
                .await?;
            match decision {
                SamplingDecision::Empty => return Ok(Bytes::new()),
                SamplingDecision::Sample(sampling) => {
                    query.size = sampling.query_size;
                    if sampling.drop_geometry {
                        query.select = Some(without_shape(dataset, query.select.take()));
                    }
                }
            }
        }

        let response = self.search.search(dataset, &query).await?;
        if response.hits.is_empty() {
            return Ok(Bytes::new());
        }
        let collection = geojson::feature_collection(&response);
        Ok(Bytes::from(encode_tile(&collection, request.coord)))
    }

    /// Streams every matching row, fetching one page at a time.
    pub fn export_rows<'a>(
        &'a self,
        dataset: &'a Dataset,
        query: SearchQuery,
    ) -> impl Stream<Item = EngineResult<SearchHit>> + Send + 'a {
        self.export_pages(dataset, query)
            .map_ok(|hits| stream::iter(hits.into_iter().map(Ok::<_, EngineError>)))
            .try_flatten()
    }

    /// Streams every matching row by pages of `pagination.max_size`. The next
    /// page is only fetched once the previous one was consumed.
    pub fn export_pages<'a>(
        &'a self,
        dataset: &'a Dataset,
        mut query: SearchQuery,
    ) -> impl Stream<Item = EngineResult<Vec<SearchHit>>> + Send + 'a {
        query.size = self.config.pagination.max_size;
        query.after = None;
        stream::try_unfold(Some(query), move |state| self.next_page(dataset, state))
    }

    async fn next_page(
        &self,
        dataset: &Dataset,
        state: Option<SearchQuery>,
    ) -> EngineResult<Option<(Vec<SearchHit>, Option<SearchQuery>)>> {
        let Some(query) = state else {
            return Ok(None);
        };
        let response = self.search.search(dataset, &query).await?;
        if response.hits.is_empty() {
            return Ok(None);
        }
        let next = match response.hits.last() {
            Some(last) if response.hits.len() as u64 >= query.size => Some(SearchQuery {
                after: Some(last.sort.clone()),
                ..query
            }),
            _ => None,
        };
        Ok(Some((response.hits, next)))
    }

    /// Streams the whole dataset as CSV: the header chunk, then one chunk per
    /// row.
    pub fn export_csv<'a>(
        &'a self,
        dataset: &'a Dataset,
        query: &LinesQuery,
    ) -> EngineResult<impl Stream<Item = EngineResult<Bytes>> + Send + 'a> {
        ensure_readable(dataset)?;
        let options = query.csv_options();
        let columns = csv::columns(dataset, query.select.as_deref());
        let header = csv::header_chunk(&columns, options)?;
        let rows = self
            .export_rows(dataset, self.search_query(query, 0)?)
            .map(move |hit| hit.and_then(|hit| csv::row_chunk(&columns, &hit, options)));
        Ok(stream::once(future::ready(Ok(header))).chain(rows))
    }

    /// Streams the whole dataset as a spreadsheet archive.
    ///
    /// The first chunk holds the fixed parts and the header row, then one
    /// chunk follows per page of rows, then the closing chunk with the
    /// archive directory.
    pub fn export_sheet<'a>(
        &'a self,
        dataset: &'a Dataset,
        query: &LinesQuery,
        kind: SheetKind,
    ) -> EngineResult<impl Stream<Item = EngineResult<Bytes>> + Send + 'a> {
        ensure_readable(dataset)?;
        let columns = csv::columns(dataset, query.select.as_deref());
        let writer = SheetWriter::new(kind, columns)?;
        let head = writer.take_chunk();
        let pages = Box::pin(self.export_pages(dataset, self.search_query(query, 0)?));

        let body = stream::try_unfold((Some(writer), pages), move |(writer, mut pages)| async move {
            let Some(mut writer) = writer else {
                return Ok(None);
            };
            match pages.try_next().await? {
                Some(hits) => {
                    writer.write_rows(&hits)?;
                    let chunk = writer.take_chunk();
                    Ok(Some((chunk, (Some(writer), pages))))
                }
                None => {
                    debug!(rows = writer.rows(), kind = kind.extension(), "Sheet export done");
                    let tail = writer.finish()?;
                    Ok(Some((tail, (None, pages))))
                }
            }
        });
        Ok(stream::once(future::ready(Ok(head))).chain(body))
    }
}

fn sheet_kind(format: OutputFormat) -> SheetKind {
    if format == OutputFormat::Ods {
        SheetKind::Ods
    } else {
        SheetKind::Xlsx
    }
}

/// Returns the selected fields minus the geometry shape, so that features
/// degrade to points.
fn without_shape(dataset: &Dataset, select: Option<Vec<String>>) -> Vec<String> {
    let keys = select.unwrap_or_else(|| dataset.schema.iter().map(|f| f.key.clone()).collect());
    let mut keys: Vec<String> = keys.into_iter().filter(|k| k != "_geoshape").collect();
    if !keys.iter().any(|k| k == "_geopoint") {
        keys.push("_geopoint".to_string());
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!("GeoJSON".parse::<OutputFormat>().unwrap(), OutputFormat::GeoJson);
        assert_eq!("pbf".parse::<OutputFormat>().unwrap(), OutputFormat::Mvt);
        assert!(matches!(
            "shp".parse::<OutputFormat>(),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_link_params() {
        let mut query = LinesQuery::new(OutputFormat::Csv);
        query.q = Some("gare".to_string());
        query.sort = vec![SortField::desc("date")];
        query.filters.insert("city".to_string(), "Lyon".to_string());
        let params = query.link_params(20);
        assert_eq!(
            params,
            vec![
                ("size".to_string(), "20".to_string()),
                ("format".to_string(), "csv".to_string()),
                ("city_eq".to_string(), "Lyon".to_string()),
                ("q".to_string(), "gare".to_string()),
                ("sort".to_string(), "-date".to_string()),
            ]
        );
    }

    #[test]
    fn test_without_shape_keeps_point() {
        let dataset = Dataset::new("ds");
        let keys = without_shape(
            &dataset,
            Some(vec!["name".to_string(), "_geoshape".to_string()]),
        );
        assert_eq!(keys, vec!["name".to_string(), "_geopoint".to_string()]);
    }
}
