use std::fmt::Debug;

use async_trait::async_trait;
use elasticsearch::http::response::Response;
use elasticsearch::indices::{IndicesDeleteParts, IndicesGetAliasParts, IndicesPutMappingParts};
use elasticsearch::{CountParts, Elasticsearch, SearchParts};
use serde_json::Value;

use super::client::{ElasticsearchConfig, build_client};
use super::query::{count_body, parse_search_response, search_body};
use crate::core::SearchEngine;
use crate::error::{BackendError, EngineError, EngineResult, IndexError};
use crate::schema::mapping::{alias_name, index_mapping, search_targets};
use crate::types::{Dataset, Field, SearchQuery, SearchResponse};

fn internal_error(message: String) -> EngineError {
    EngineError::Backend(BackendError::Internal {
        backend_name: "elasticsearch".to_string(),
        message,
        source: None,
    })
}

/// Search engine backed by an Elasticsearch cluster.
pub struct ElasticsearchSearchEngine {
    client: Elasticsearch,
    config: ElasticsearchConfig,
}

impl Debug for ElasticsearchSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchSearchEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchSearchEngine {
    /// Creates an engine with the given configuration.
    ///
    /// No request is sent until the first search.
    pub fn new(config: ElasticsearchConfig) -> EngineResult<Self> {
        let client = build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    fn targets(&self, dataset: &Dataset) -> Vec<String> {
        search_targets(&self.config.index_prefix, dataset)
    }

    async fn read_json(response: Response, action: &str) -> EngineResult<Value> {
        if !response.status_code().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!("{} failed: {}", action, body)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| internal_error(format!("Failed to parse {} response: {}", action, e)))
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchSearchEngine {
    fn backend_name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn count(&self, dataset: &Dataset, query: &SearchQuery) -> EngineResult<u64> {
        let targets = self.targets(dataset);
        let indices: Vec<&str> = targets.iter().map(String::as_str).collect();
        let response = self
            .client
            .count(CountParts::Index(&indices))
            .body(count_body(&dataset.schema, query))
            .send()
            .await?;
        let body = Self::read_json(response, "Count").await?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or_default())
    }

    async fn search(&self, dataset: &Dataset, query: &SearchQuery) -> EngineResult<SearchResponse> {
        let targets = self.targets(dataset);
        let indices: Vec<&str> = targets.iter().map(String::as_str).collect();
        let body = search_body(&dataset.schema, query);
        tracing::debug!(dataset_id = %dataset.id, indices = ?indices, "Searching rows");
        let response = self
            .client
            .search(SearchParts::Index(&indices))
            .body(body)
            .send()
            .await?;
        let body = Self::read_json(response, "Search").await?;
        Ok(parse_search_response(&body))
    }

    async fn update_mapping(&self, dataset_id: &str, schema: &[Field]) -> EngineResult<()> {
        let alias = alias_name(&self.config.index_prefix, dataset_id, false);
        let response = self
            .client
            .indices()
            .put_mapping(IndicesPutMappingParts::Index(&[&alias]))
            .body(index_mapping(schema))
            .send()
            .await?;

        let status = response.status_code();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if body.contains("index_not_found_exception") {
            return Err(IndexError::IndexNotFound {
                dataset_id: dataset_id.to_string(),
            }
            .into());
        }
        if status.as_u16() == 400 && body.contains("illegal_argument_exception") {
            return Err(IndexError::MappingIncompatible {
                dataset_id: dataset_id.to_string(),
                reason: body,
            }
            .into());
        }
        Err(internal_error(format!("Mapping update failed: {}", body)))
    }

    async fn delete(&self, dataset_id: &str) -> EngineResult<()> {
        let prefix = &self.config.index_prefix;
        let aliases = [
            alias_name(prefix, dataset_id, false),
            alias_name(prefix, dataset_id, true),
        ];
        let names: Vec<&str> = aliases.iter().map(String::as_str).collect();
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&names))
            .send()
            .await?;
        if response.status_code().as_u16() == 404 {
            return Ok(());
        }
        let body = Self::read_json(response, "Alias lookup").await?;
        let indices: Vec<&str> = body
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        if indices.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&indices))
            .send()
            .await?;
        if !response.status_code().is_success() && response.status_code().as_u16() != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(internal_error(format!("Index deletion failed: {}", body)));
        }
        tracing::info!(dataset_id, indices = ?indices, "Deleted dataset indices");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_use_configured_prefix() {
        let engine = ElasticsearchSearchEngine::new(ElasticsearchConfig {
            index_prefix: "tessera".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(engine.targets(&Dataset::new("abc")), vec!["tessera-abc".to_string()]);
        assert_eq!(engine.backend_name(), "elasticsearch");
    }
}
