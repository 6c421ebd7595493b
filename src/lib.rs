#![warn(missing_docs)]
//! Conversational retrieval-augmented question answering over a Pinecone index.
//!
//! Each turn rewrites the question into a standalone query, retrieves the
//! nearest passages and asks the model to answer strictly from them.

pub mod config;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod history;
mod http;
pub mod llm;
pub mod prompts;
pub mod repl;
pub mod retriever;
pub mod rewriter;
pub mod session;
pub mod vector_store;

pub use config::{Cli, Settings};
pub use embedder::{CachedEmbedder, Embedder};
pub use error::{RagError, Stage};
pub use generator::AnswerGenerator;
pub use history::{ConversationHistory, ProvisionalTurn, Role, Turn};
pub use llm::{GenerationRequest, LlmProvider, Sampling};
pub use prompts::PromptTemplates;
pub use retriever::{MalformedMatchPolicy, RetrievedContext, Retriever};
pub use rewriter::QueryRewriter;
pub use session::{RagSession, TurnEvent, TurnOutcome};
pub use vector_store::{IndexMatch, PineconeIndex, VectorIndex};
