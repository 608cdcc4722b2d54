use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

use crate::cache::{CacheKey, CacheKind, ResultCache};
use crate::core::SearchEngine;
use crate::error::{CacheError, EngineError, EngineResult};
use crate::tiles::{TileCoord, TileCounter};
use crate::types::{Dataset, SamplingMode, SearchQuery};

/// Counts tile rows through the search engine, with cached counts.
pub struct SearchTileCounter<'a> {
    search: &'a dyn SearchEngine,
    dataset: &'a Dataset,
    query: SearchQuery,
    cache: Option<&'a ResultCache>,
}

impl<'a> SearchTileCounter<'a> {
    /// Creates a counter applying the filters and full-text query of `query`.
    pub fn new(search: &'a dyn SearchEngine, dataset: &'a Dataset, query: &SearchQuery) -> Self {
        Self {
            search,
            dataset,
            query: query.count_query(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn cache_key(&self, tile: TileCoord) -> CacheKey {
        CacheKey::new(
            CacheKind::TileCount,
            self.dataset,
            SamplingMode::default(),
            json!({
                "xyz": [tile.x, tile.y, tile.z],
                "filters": self.query.filters,
                "q": self.query.q,
            }),
        )
    }
}

fn decode_count(bytes: &[u8], key: &CacheKey) -> EngineResult<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            EngineError::Cache(CacheError::Corrupt {
                hash: key.hash().unwrap_or_default(),
            })
        })
}

#[async_trait]
impl TileCounter for SearchTileCounter<'_> {
    async fn count(&self, tile: TileCoord) -> EngineResult<u64> {
        let query = SearchQuery {
            tile: Some(tile),
            ..self.query.clone()
        };
        let Some(cache) = self.cache else {
            return self.search.count(self.dataset, &query).await;
        };

        let key = self.cache_key(tile);
        if let Some(bytes) = cache.get(&key).await {
            match decode_count(&bytes, &key) {
                Ok(count) => return Ok(count),
                Err(e) => tracing::warn!(error = %e, tile = %tile, "Ignoring cached tile count"),
            }
        }
        let count = self.search.count(self.dataset, &query).await?;
        cache.put_detached(&key, Bytes::from(count.to_string()));
        Ok(count)
    }
}
