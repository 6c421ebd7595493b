//! OpenAI-based embedding client implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{post_with_retry, Embedder};
use crate::http::json_client;

/// Embeddings client that talks to OpenAI-compatible endpoints.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_attempts: usize,
}

impl OpenAiEmbedder {
    /// Builds a new OpenAI embeddings client.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing OpenAI model name");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        let client = json_client(headers, timeout, "OpenAI")?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            dimensions,
            max_attempts: max_attempts.max(1),
        })
    }

    /// Sends a batch of strings to OpenAI and returns embedding vectors in input order.
    pub async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let parsed: EmbeddingResponse = post_with_retry(
            &self.client,
            &self.endpoint,
            &request,
            self.max_attempts,
            "OpenAI embeddings",
        )
        .await?;
        parsed.into_vectors(inputs.len())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        let vector = vectors.pop().unwrap_or_default();
        anyhow::ensure!(!vector.is_empty(), "OpenAI returned an empty embedding");
        Ok(vector)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>> {
        self.data.sort_by_key(|entry| entry.index);
        anyhow::ensure!(
            self.data.len() == expected,
            "OpenAI returned {} embeddings for {} inputs",
            self.data.len(),
            expected
        );
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vectors_follow_input_order() {
        let parsed: EmbeddingResponse = serde_json::from_value(json!({
            "data": [
                {"embedding": [2.0, 2.0], "index": 1},
                {"embedding": [1.0, 1.0], "index": 0}
            ]
        }))
        .unwrap();
        let vectors = parsed.into_vectors(2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let parsed: EmbeddingResponse =
            serde_json::from_value(json!({"data": [{"embedding": [1.0], "index": 0}]})).unwrap();
        assert!(parsed.into_vectors(2).is_err());
    }

    #[test]
    fn dimensions_are_omitted_when_unset() {
        let inputs = ["hash map"];
        let request = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &inputs,
            dimensions: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"model": "text-embedding-3-small", "input": ["hash map"]})
        );
    }
}
