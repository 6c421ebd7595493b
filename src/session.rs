//! Chat session: owns the history and runs one rewrite → retrieve → answer turn at a time.

use tracing::{info, warn};

use crate::error::{RagError, Stage};
use crate::generator::AnswerGenerator;
use crate::history::ConversationHistory;
use crate::retriever::Retriever;
use crate::rewriter::QueryRewriter;

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Standalone question actually searched and answered.
    pub standalone_query: String,
    /// Model answer, also stored in history.
    pub answer: String,
    /// Passages included in the grounding context.
    pub passages: usize,
    /// Grounding context the answer was produced from.
    pub context: String,
}

impl TurnOutcome {
    /// Whether the rewrite changed the wording of `question`.
    pub fn was_rewritten(&self, question: &str) -> bool {
        self.standalone_query.trim() != question.trim()
    }
}

/// Stage transitions reported while a turn runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The rewrite changed the question; carries the standalone query.
    Rewritten(String),
    /// Embedding and index search are starting.
    Retrieving,
    /// The answer call is starting.
    Generating,
}

/// Explicit conversation context; construct one per interactive session.
pub struct RagSession {
    history: ConversationHistory,
    rewriter: QueryRewriter,
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl RagSession {
    /// Wires the three stages around an empty history.
    pub fn new(rewriter: QueryRewriter, retriever: Retriever, generator: AnswerGenerator) -> Self {
        Self {
            history: ConversationHistory::new(),
            rewriter,
            retriever,
            generator,
        }
    }

    /// Read-only view of the conversation so far.
    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Forgets the conversation.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Runs one full turn for `question`.
    ///
    /// On failure the history is restored to its state before the call.
    pub async fn chat_turn(&mut self, question: &str) -> Result<TurnOutcome, RagError> {
        self.chat_turn_observed(question, |_| {}).await
    }

    /// Like [`chat_turn`](Self::chat_turn), reporting each stage to `on_event`
    /// as it begins.
    pub async fn chat_turn_observed<F>(
        &mut self,
        question: &str,
        on_event: F,
    ) -> Result<TurnOutcome, RagError>
    where
        F: FnMut(TurnEvent),
    {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }
        let checkpoint = self.history.checkpoint();
        let result = self.run_stages(question, on_event).await;
        if let Err(err) = &result {
            let removed = self.history.rollback(checkpoint);
            warn!(error = %err, removed, "turn failed; history restored");
        }
        result
    }

    async fn run_stages<F>(
        &mut self,
        question: &str,
        mut on_event: F,
    ) -> Result<TurnOutcome, RagError>
    where
        F: FnMut(TurnEvent),
    {
        info!(stage = %Stage::Rewriting, turns = self.history.len(), "turn started");
        let standalone_query = self.rewriter.rewrite(&mut self.history, question).await?;
        if standalone_query != question {
            info!(rewritten = %standalone_query, "question rewritten");
            on_event(TurnEvent::Rewritten(standalone_query.clone()));
        }

        on_event(TurnEvent::Retrieving);
        info!(stage = %Stage::Retrieving, "searching knowledge base");
        let context = self
            .retriever
            .retrieve(&standalone_query)
            .await
            .map_err(|err| RagError::service(Stage::Retrieving, err))?;

        on_event(TurnEvent::Generating);
        info!(
            stage = %Stage::Generating,
            passages = context.passages,
            skipped = context.skipped,
            "generating answer"
        );
        let answer = self
            .generator
            .answer(&mut self.history, &standalone_query, &context.text)
            .await?;

        info!(turns = self.history.len(), "turn complete");
        Ok(TurnOutcome {
            standalone_query,
            answer,
            passages: context.passages,
            context: context.text,
        })
    }
}
