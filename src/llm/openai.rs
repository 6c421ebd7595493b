use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerationRequest, LlmProvider};
use crate::history::Role;
use crate::http::{json_client, read_json};

/// Default base URL for OpenAI-compatible endpoints.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI chat-completions client.
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiProvider {
    /// Builds a client for `model` under `base_url`.
    pub fn new(api_key: &str, base_url: &str, model: String, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing OpenAI API key");
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenAI API key")?,
        );
        let client = json_client(headers, timeout, "OpenAI")?;
        let endpoint = format!("{}/chat/completions", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = build_request(&self.model, request);
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("failed to call OpenAI chat completions")?;
        let parsed: ChatResponse = read_json(resp, "OpenAI").await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("OpenAI response missing message content"))
    }
}

fn build_request<'a>(model: &'a str, request: &GenerationRequest<'a>) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(request.conversation.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: request.system_instruction,
    });
    messages.extend(request.conversation.iter().map(|turn| ChatMessage {
        role: match turn.role() {
            Role::User => "user",
            Role::Model => "assistant",
        },
        content: turn.text(),
    }));
    ChatRequest {
        model,
        temperature: request.sampling.temperature,
        max_tokens: request.sampling.max_tokens,
        messages,
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Turn;
    use crate::llm::Sampling;
    use serde_json::json;

    #[test]
    fn system_message_leads_and_model_maps_to_assistant() {
        let conversation = [Turn::user("q1"), Turn::model("a1"), Turn::user("q2")];
        let request = GenerationRequest {
            conversation: &conversation,
            system_instruction: "answer from context",
            sampling: Sampling::default(),
        };
        let value = serde_json::to_value(build_request("gpt-4o-mini", &request)).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-4o-mini",
                "max_tokens": 1024,
                "messages": [
                    {"role": "system", "content": "answer from context"},
                    {"role": "user", "content": "q1"},
                    {"role": "assistant", "content": "a1"},
                    {"role": "user", "content": "q2"}
                ]
            })
        );
    }
}
