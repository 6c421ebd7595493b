//! Pinecone vector index client used for nearest-neighbour lookups.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::http::{json_client, read_json, secret_header};

/// Control-plane base used to resolve an index name to its data-plane host.
pub const PINECONE_CONTROL_PLANE: &str = "https://api.pinecone.io";
const PINECONE_API_VERSION: &str = "2024-07";

/// One scored match returned by the index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexMatch {
    /// Record identifier.
    #[serde(default)]
    pub id: String,
    /// Similarity score as reported by the index.
    #[serde(default)]
    pub score: f32,
    /// Stored metadata; expected to carry a `text` field.
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl IndexMatch {
    /// Builds a match whose metadata holds only `text`.
    pub fn with_text(id: impl Into<String>, score: f32, text: impl Into<String>) -> Self {
        let mut metadata = Map::new();
        metadata.insert("text".to_string(), Value::String(text.into()));
        Self {
            id: id.into(),
            score,
            metadata: Some(metadata),
        }
    }

    /// Passage text stored under `metadata.text`, when present and a string.
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get("text"))
            .and_then(Value::as_str)
    }
}

/// Read-only nearest-neighbour search over a pre-populated index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns up to `top_k` matches for `vector`, metadata included, in index order.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>>;
}

/// Pinecone data-plane client bound to one index host and optional namespace.
pub struct PineconeIndex {
    client: Client,
    endpoint: String,
    namespace: Option<String>,
}

impl PineconeIndex {
    /// Builds a client for the index served at `host`.
    pub fn new(
        api_key: &str,
        host: &str,
        namespace: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base = normalize_host(host)?;
        let client = json_client(pinecone_headers(api_key)?, timeout, "Pinecone")?;
        Ok(Self {
            client,
            endpoint: format!("{}/query", base.trim_end_matches('/')),
            namespace: namespace.filter(|ns| !ns.trim().is_empty()),
        })
    }

    /// Looks up the data-plane host of `index_name` through the control plane.
    pub async fn resolve_host(
        api_key: &str,
        control_plane: &str,
        index_name: &str,
        timeout: Duration,
    ) -> Result<String> {
        anyhow::ensure!(!index_name.trim().is_empty(), "missing Pinecone index name");
        let client = json_client(pinecone_headers(api_key)?, timeout, "Pinecone")?;
        let url = format!(
            "{}/indexes/{}",
            control_plane.trim_end_matches('/'),
            index_name.trim()
        );
        let resp = client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to describe Pinecone index '{index_name}'"))?;
        let described: DescribeIndexResponse = read_json(resp, "Pinecone control plane").await?;
        debug!(index = index_name, host = %described.host, "resolved Pinecone index host");
        Ok(described.host)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("failed to call Pinecone query")?;
        let parsed: QueryResponse = read_json(resp, "Pinecone").await?;
        Ok(parsed.matches)
    }
}

fn pinecone_headers(api_key: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert("Api-Key", secret_header(api_key, "Pinecone API key")?);
    headers.insert(
        "X-Pinecone-API-Version",
        HeaderValue::from_static(PINECONE_API_VERSION),
    );
    Ok(headers)
}

/// Accepts bare hosts (as returned by the control plane) or full http(s) URLs.
pub fn normalize_host(host: &str) -> Result<String> {
    let host = host.trim();
    anyhow::ensure!(!host.is_empty(), "missing Pinecone index host");
    let candidate = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let parsed = Url::parse(&candidate)
        .with_context(|| format!("invalid Pinecone index host '{host}'"))?;
    anyhow::ensure!(
        parsed.host_str().is_some(),
        "Pinecone index host '{host}' has no hostname"
    );
    Ok(candidate.trim_end_matches('/').to_string())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<IndexMatch>,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    host: String,
}
