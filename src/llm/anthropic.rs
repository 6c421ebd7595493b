use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, LlmProvider};
use crate::history::Role;
use crate::http::{json_client, read_json, secret_header};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic messages client.
pub struct AnthropicProvider {
    model: String,
    client: Client,
}

impl AnthropicProvider {
    /// Builds a client for `model`.
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", secret_header(api_key, "Anthropic API key")?);
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        let client = json_client(headers, timeout, "Anthropic")?;
        Ok(Self { model, client })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = build_request(&self.model, request);
        let resp = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .json(&body)
            .send()
            .await
            .context("failed to call Anthropic messages API")?;
        let parsed: AnthropicResponse = read_json(resp, "Anthropic").await?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        if answer.is_empty() {
            bail!("Anthropic response missing text content");
        }
        Ok(answer)
    }
}

fn build_request<'a>(model: &'a str, request: &GenerationRequest<'a>) -> AnthropicRequest<'a> {
    AnthropicRequest {
        model,
        max_tokens: request.sampling.max_tokens,
        temperature: request.sampling.temperature,
        system: request.system_instruction,
        messages: request
            .conversation
            .iter()
            .map(|turn| AnthropicMessage {
                role: match turn.role() {
                    Role::User => "user",
                    Role::Model => "assistant",
                },
                content: vec![AnthropicContentBlock {
                    kind: "text",
                    text: turn.text(),
                }],
            })
            .collect(),
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<AnthropicContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}
