//! Language-model providers.

use anyhow::Result;
use async_trait::async_trait;

use crate::history::Turn;

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::{GeminiProvider, GEMINI_BASE_URL};
pub use openai::{OpenAiProvider, OPENAI_BASE_URL};

/// Sampling knobs forwarded with every generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    /// Provider default when `None`.
    pub temperature: Option<f32>,
    /// Upper bound on generated tokens.
    pub max_tokens: usize,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: None,
            max_tokens: 1024,
        }
    }
}

/// Request envelope shared by the various providers.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// Structured conversation, oldest turn first; the last turn is the one to act on.
    pub conversation: &'a [Turn],
    /// Directive steering the model for this call.
    pub system_instruction: &'a str,
    /// Sampling parameters.
    pub sampling: Sampling,
}

/// Trait implemented by concrete LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generates a reply to `request.conversation` and returns its text.
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String>;
}
