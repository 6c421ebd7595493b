//! Conversation log shared by the rewriting and answering model calls.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RagError;

/// Author of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Input supplied to the model.
    User,
    /// Text generated by the model.
    Model,
}

impl Role {
    /// Lowercase wire name (`user` / `model`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One role-tagged message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    /// Creates a turn with the given role.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    /// Shorthand for a `user` turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Shorthand for a `model` turn.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    /// Returns the role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the message body.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Receipt for a provisional turn; only valid until the next mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalHandle {
    revision: u64,
    index: usize,
}

/// Length marker used to undo every mutation made after it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    len: usize,
}

/// Ordered, append-only log of turns with support for staged entries.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    revision: u64,
}

impl ConversationHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a permanent turn.
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.bump();
    }

    /// Appends a turn that must be removed again with [`Self::remove_provisional`].
    pub fn append_provisional(&mut self, turn: Turn) -> ProvisionalHandle {
        self.turns.push(turn);
        self.bump();
        ProvisionalHandle {
            revision: self.revision,
            index: self.turns.len() - 1,
        }
    }

    /// Removes the turn staged under `handle`.
    ///
    /// Fails if anything touched the history after the turn was staged.
    pub fn remove_provisional(&mut self, handle: ProvisionalHandle) -> Result<Turn, RagError> {
        if handle.revision != self.revision || handle.index + 1 != self.turns.len() {
            return Err(RagError::InvariantViolation(format!(
                "history changed while a provisional turn was staged (staged at revision {} index {}, now revision {} len {})",
                handle.revision,
                handle.index,
                self.revision,
                self.turns.len()
            )));
        }
        let turn = self.turns.pop().ok_or_else(|| {
            RagError::InvariantViolation("provisional turn vanished from history".to_string())
        })?;
        self.bump();
        Ok(turn)
    }

    /// Stages `turn` for the lifetime of the returned guard.
    pub fn stage(&mut self, turn: Turn) -> ProvisionalTurn<'_> {
        let handle = self.append_provisional(turn);
        ProvisionalTurn {
            history: self,
            handle: Some(handle),
        }
    }

    /// Appends a question and its answer as a single mutation.
    pub fn commit_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.reserve(2);
        self.turns.push(Turn::user(question));
        self.turns.push(Turn::model(answer));
        self.bump();
    }

    /// Current turns, oldest first.
    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    /// Owned copy of the current turns.
    pub fn to_vec(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Conversation payload for a model call: the history (optionally only its
    /// last `window` turns) followed by `pending`, without storing `pending`.
    pub fn conversation_with(&self, pending: Turn, window: Option<usize>) -> Vec<Turn> {
        let visible = windowed(&self.turns, window);
        let mut conversation = Vec::with_capacity(visible.len() + 1);
        conversation.extend_from_slice(visible);
        conversation.push(pending);
        conversation
    }

    /// Number of stored turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the history holds no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Marks the current length for a later [`Self::rollback`].
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.turns.len(),
        }
    }

    /// Drops every turn appended after `checkpoint`. Returns how many were removed.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> usize {
        if self.turns.len() <= checkpoint.len {
            return 0;
        }
        let removed = self.turns.len() - checkpoint.len;
        self.turns.truncate(checkpoint.len);
        self.bump();
        removed
    }

    /// Forgets the whole conversation.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.bump();
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// Returns the trailing `window` turns, or all of them when `window` is `None`.
pub(crate) fn windowed(turns: &[Turn], window: Option<usize>) -> &[Turn] {
    match window {
        Some(limit) if turns.len() > limit => &turns[turns.len() - limit..],
        _ => turns,
    }
}

/// Scoped provisional turn. Removed on [`ProvisionalTurn::release`] or on drop.
pub struct ProvisionalTurn<'a> {
    history: &'a mut ConversationHistory,
    handle: Option<ProvisionalHandle>,
}

impl ProvisionalTurn<'_> {
    /// History including the staged turn.
    pub fn snapshot(&self) -> &[Turn] {
        self.history.snapshot()
    }

    /// Removes the staged turn, surfacing any symmetry violation.
    pub fn release(mut self) -> Result<(), RagError> {
        match self.handle.take() {
            Some(handle) => self.history.remove_provisional(handle).map(|_| ()),
            None => Ok(()),
        }
    }
}

impl Drop for ProvisionalTurn<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.history.remove_provisional(handle) {
                warn!(error = %err, "failed to unwind provisional turn");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seeded() -> ConversationHistory {
        let mut history = ConversationHistory::new();
        history.append(Turn::user("What is a heap?"));
        history.append(Turn::model("A heap is a tree-based priority structure."));
        history
    }

    #[test]
    fn provisional_turn_is_removed_on_release() {
        let mut history = seeded();
        let before = history.to_vec();

        let staged = history.stage(Turn::user("and its complexity?"));
        assert_eq!(staged.snapshot().len(), 3);
        assert_eq!(staged.snapshot()[2].text(), "and its complexity?");
        staged.release().expect("symmetric release");

        assert_eq!(history.snapshot(), before.as_slice());
    }

    #[test]
    fn provisional_turn_is_removed_on_drop() {
        let mut history = seeded();
        let before = history.to_vec();
        {
            let _staged = history.stage(Turn::user("dropped early"));
        }
        assert_eq!(history.snapshot(), before.as_slice());
    }

    #[test]
    fn mutation_after_staging_is_an_invariant_violation() {
        let mut history = seeded();
        let handle = history.append_provisional(Turn::user("staged"));
        history.append(Turn::model("interloper"));

        let err = history.remove_provisional(handle).unwrap_err();
        assert!(matches!(err, RagError::InvariantViolation(_)));
        assert_eq!(history.len(), 4);
    }

    #[test]
    fn stale_handle_is_rejected_after_removal() {
        let mut history = seeded();
        let handle = history.append_provisional(Turn::user("once"));
        history.remove_provisional(handle).expect("first removal");
        assert!(history.remove_provisional(handle).is_err());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn commit_exchange_appends_user_then_model() {
        let mut history = ConversationHistory::new();
        history.commit_exchange("q", "a");
        assert_eq!(history.snapshot(), &[Turn::user("q"), Turn::model("a")]);
    }

    #[test]
    fn conversation_with_leaves_history_untouched() {
        let history = seeded();
        let conversation = history.conversation_with(Turn::user("next"), None);
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.last(), Some(&Turn::user("next")));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn window_keeps_most_recent_turns() {
        let mut history = seeded();
        history.commit_exchange("second", "second answer");
        let conversation = history.conversation_with(Turn::user("third"), Some(2));
        assert_eq!(
            conversation,
            vec![
                Turn::user("second"),
                Turn::model("second answer"),
                Turn::user("third"),
            ]
        );
        assert_eq!(windowed(history.snapshot(), Some(10)).len(), 4);
        assert!(windowed(history.snapshot(), Some(0)).is_empty());
    }

    #[test]
    fn rollback_truncates_to_checkpoint() {
        let mut history = seeded();
        let checkpoint = history.checkpoint();
        history.append(Turn::user("orphan"));
        assert_eq!(history.rollback(checkpoint), 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.rollback(checkpoint), 0);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Turn::model("hi")).unwrap();
        assert_eq!(json, r#"{"role":"model","text":"hi"}"#);
        assert_eq!(Role::User.as_str(), "user");
    }
}
