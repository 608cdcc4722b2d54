use std::time::Duration;

use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{BackendError, EngineResult};

/// Authentication against the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration of the Elasticsearch search engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Node URLs. Only the first one is used (single-node connection pool).
    pub nodes: Vec<String>,

    /// Alias prefix (default: `"dataset"`).
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Request timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Disables certificate validation. Development clusters only.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_index_prefix() -> String {
    "dataset".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            index_prefix: default_index_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
        }
    }
}

fn connection_error(message: String) -> BackendError {
    BackendError::Unavailable {
        backend_name: "elasticsearch".to_string(),
        message,
    }
}

/// Builds a client from configuration.
pub(super) fn build_client(config: &ElasticsearchConfig) -> EngineResult<Elasticsearch> {
    let url = config
        .nodes
        .first()
        .cloned()
        .unwrap_or_else(|| "http://localhost:9200".to_string());

    let parsed_url: elasticsearch::http::Url = url
        .parse()
        .map_err(|e| connection_error(format!("Invalid URL {}: {}", url, e)))?;

    let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(parsed_url))
        .timeout(Duration::from_millis(config.request_timeout_ms));

    if config.disable_certificate_validation {
        builder = builder.cert_validation(CertificateValidation::None);
    }

    if let Some(auth) = &config.auth {
        builder = builder.auth(match auth {
            ElasticsearchAuth::Basic { username, password } => {
                Credentials::Basic(username.clone(), password.clone())
            }
            ElasticsearchAuth::Bearer { token } => Credentials::Bearer(token.clone()),
        });
    }

    let transport = builder
        .build()
        .map_err(|e| connection_error(format!("Failed to build transport: {}", e)))?;

    Ok(Elasticsearch::new(transport))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ElasticsearchConfig::default();
        assert_eq!(config.index_prefix, "dataset");
        assert_eq!(config.nodes, vec!["http://localhost:9200"]);
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_config_from_json() {
        let config: ElasticsearchConfig = serde_json::from_value(serde_json::json!({
            "nodes": ["https://search:9200"],
            "auth": {"Bearer": {"token": "secret"}}
        }))
        .unwrap();
        assert_eq!(config.request_timeout_ms, 30000);
        assert!(matches!(config.auth, Some(ElasticsearchAuth::Bearer { .. })));
    }

    #[test]
    fn test_invalid_node_url() {
        let config = ElasticsearchConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        };
        assert!(build_client(&config).is_err());
    }
}
