//! Produces the grounded answer and commits the exchange to history.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::error::{RagError, Stage};
use crate::history::{ConversationHistory, Turn};
use crate::llm::{GenerationRequest, LlmProvider, Sampling};
use crate::prompts::PromptTemplates;

/// Second model call of a turn.
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    prompts: PromptTemplates,
    sampling: Sampling,
    history_window: Option<usize>,
}

impl AnswerGenerator {
    /// Creates a generator. `history_window` caps how many stored turns are
    /// sent with each call (`None` sends all of them).
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompts: PromptTemplates,
        sampling: Sampling,
        history_window: Option<usize>,
    ) -> Self {
        Self {
            llm,
            prompts,
            sampling,
            history_window,
        }
    }

    /// Answers `rewritten_query` from `context`.
    ///
    /// The query and the answer are appended to `history` together, and only
    /// once the model call has succeeded.
    pub async fn answer(
        &self,
        history: &mut ConversationHistory,
        rewritten_query: &str,
        context: &str,
    ) -> Result<String, RagError> {
        let conversation =
            history.conversation_with(Turn::user(rewritten_query), self.history_window);
        let instruction = self.prompts.answer_instruction(context);
        debug!(
            turns = conversation.len(),
            instruction_len = instruction.len(),
            "requesting grounded answer"
        );
        let request = GenerationRequest {
            conversation: &conversation,
            system_instruction: &instruction,
            sampling: self.sampling,
        };
        let answer = self
            .llm
            .generate(&request)
            .await
            .map_err(|err| RagError::service(Stage::Generating, err))?;

        let answer = answer.trim();
        if answer.is_empty() {
            return Err(RagError::service(
                Stage::Generating,
                anyhow!("model returned an empty answer"),
            ));
        }
        history.commit_exchange(rewritten_query, answer);
        Ok(answer.to_string())
    }
}
