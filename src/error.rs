//! Error taxonomy surfaced by a chat session.

use std::fmt;

/// Pipeline stage a turn was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Turning the raw question into a standalone query.
    Rewriting,
    /// Embedding the query and searching the vector index.
    Retrieving,
    /// Producing the grounded answer.
    Generating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Rewriting => "rewriting",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
        };
        f.write_str(label)
    }
}

/// Errors returned by the chat pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Missing or invalid credentials, endpoints, or options.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The question was blank after trimming.
    #[error("question cannot be empty")]
    EmptyQuestion,
    /// A remote call (embedding, vector index, or language model) failed.
    #[error("{stage} failed: {message}")]
    ServiceCall {
        /// Stage that issued the call.
        stage: Stage,
        /// Full error chain from the client.
        message: String,
    },
    /// Provisional history bookkeeping went out of sync.
    #[error("history invariant violated: {0}")]
    InvariantViolation(String),
}

impl RagError {
    /// Wraps a client error for the given stage, keeping its context chain.
    pub fn service(stage: Stage, err: anyhow::Error) -> Self {
        RagError::ServiceCall {
            stage,
            message: format!("{err:#}"),
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        RagError::Configuration(message.into())
    }
}
