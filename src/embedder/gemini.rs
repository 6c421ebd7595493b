//! Google Gemini `embedContent` client.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{post_with_retry, Embedder};
use crate::http::{json_client, secret_header};

/// Embeddings client for the Gemini API.
#[derive(Clone)]
pub struct GeminiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    max_attempts: usize,
}

impl GeminiEmbedder {
    /// Builds a client for `model` (with or without the `models/` prefix).
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        timeout: Duration,
        max_attempts: usize,
    ) -> Result<Self> {
        let model = model.trim().trim_start_matches("models/");
        anyhow::ensure!(!model.is_empty(), "missing Gemini embedding model name");
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", secret_header(api_key, "Gemini API key")?);
        let client = json_client(headers, timeout, "Gemini")?;
        let endpoint = format!(
            "{}/models/{}:embedContent",
            base_url.trim_end_matches('/'),
            model
        );
        Ok(Self {
            client,
            endpoint,
            model: format!("models/{model}"),
            max_attempts: max_attempts.max(1),
        })
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
        };
        let parsed: EmbedContentResponse = post_with_retry(
            &self.client,
            &self.endpoint,
            &request,
            self.max_attempts,
            "Gemini embedContent",
        )
        .await?;
        let values = parsed.embedding.values;
        anyhow::ensure!(!values.is_empty(), "Gemini returned an empty embedding");
        Ok(values)
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}
