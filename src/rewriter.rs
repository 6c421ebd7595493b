//! Rewrites follow-up questions into standalone queries.

use std::sync::Arc;

use tracing::debug;

use crate::error::{RagError, Stage};
use crate::history::{windowed, ConversationHistory, Turn};
use crate::llm::{GenerationRequest, LlmProvider, Sampling};
use crate::prompts::PromptTemplates;

/// First model call of a turn.
pub struct QueryRewriter {
    llm: Arc<dyn LlmProvider>,
    instruction: String,
    sampling: Sampling,
    history_window: Option<usize>,
}

impl QueryRewriter {
    /// Creates a rewriter using the rewrite instruction from `prompts`.
    /// `history_window` caps how many stored turns accompany the question
    /// (`None` sends all of them).
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        prompts: &PromptTemplates,
        sampling: Sampling,
        history_window: Option<usize>,
    ) -> Self {
        Self {
            llm,
            instruction: prompts.rewrite_instruction(),
            sampling,
            history_window,
        }
    }

    /// Returns a standalone version of `raw_question`.
    ///
    /// The question is staged on `history` only for the duration of the model
    /// call; the history is identical before and after, whether the call
    /// succeeds or fails.
    pub async fn rewrite(
        &self,
        history: &mut ConversationHistory,
        raw_question: &str,
    ) -> Result<String, RagError> {
        let staged = history.stage(Turn::user(raw_question));
        let result = {
            let request = GenerationRequest {
                // The staged question is the last turn and always survives the window.
                conversation: windowed(staged.snapshot(), self.history_window.map(|w| w + 1)),
                system_instruction: &self.instruction,
                sampling: self.sampling,
            };
            self.llm.generate(&request).await
        };
        staged.release()?;

        let rewritten = result.map_err(|err| RagError::service(Stage::Rewriting, err))?;
        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            debug!("model returned an empty rewrite; using the question verbatim");
            return Ok(raw_question.trim().to_string());
        }
        Ok(rewritten.to_string())
    }
}
