//! Command-line and environment configuration, validated once at startup.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::debug;

use crate::embedder::{CachedEmbedder, Embedder, GeminiEmbedder, OpenAiEmbedder};
use crate::error::RagError;
use crate::generator::AnswerGenerator;
use crate::llm::{
    AnthropicProvider, GeminiProvider, LlmProvider, OpenAiProvider, Sampling, GEMINI_BASE_URL,
    OPENAI_BASE_URL,
};
use crate::prompts::{PromptTemplates, DEFAULT_DOMAIN, DEFAULT_REFUSAL};
use crate::retriever::{MalformedMatchPolicy, Retriever, DEFAULT_TOP_K};
use crate::rewriter::QueryRewriter;
use crate::session::RagSession;
use crate::vector_store::{PineconeIndex, VectorIndex, PINECONE_CONTROL_PLANE};

/// Embedding backends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EmbeddingProviderArg {
    /// Gemini `embedContent`.
    Gemini,
    /// OpenAI-compatible `/embeddings`.
    Openai,
}

impl EmbeddingProviderArg {
    fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "text-embedding-004",
            Self::Openai => "text-embedding-3-small",
        }
    }
}

/// Language-model backends.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LlmProviderArg {
    /// Gemini `generateContent`.
    Gemini,
    /// OpenAI chat completions.
    Openai,
    /// Anthropic messages.
    Anthropic,
}

impl LlmProviderArg {
    fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash",
            Self::Openai => "gpt-4o-mini",
            Self::Anthropic => "claude-sonnet-4-5",
        }
    }
}

/// Command-line interface for the chat binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ragchat",
    about = "Ask domain questions answered from a Pinecone-indexed corpus"
)]
pub struct Cli {
    /// Gemini API key (embeddings and/or answers)
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// OpenAI API key (when an OpenAI provider is selected)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Anthropic API key (when --llm-provider anthropic)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: Option<String>,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pub pinecone_api_key: Option<String>,

    /// Pinecone index host; skips the control-plane lookup when set
    #[arg(long, env = "PINECONE_INDEX_HOST")]
    pub pinecone_index_host: Option<String>,

    /// Pinecone index name, resolved to a host at startup
    #[arg(long, env = "PINECONE_INDEX_NAME")]
    pub pinecone_index_name: Option<String>,

    /// Pinecone namespace to query
    #[arg(long, env = "PINECONE_NAMESPACE")]
    pub pinecone_namespace: Option<String>,

    /// Pinecone control-plane base URL
    #[arg(long, env = "PINECONE_CONTROL_PLANE", default_value = PINECONE_CONTROL_PLANE)]
    pub pinecone_control_plane: String,

    /// Embedding provider
    #[arg(long, env = "RAGCHAT_EMBEDDING_PROVIDER", value_enum, default_value = "gemini")]
    pub embedding_provider: EmbeddingProviderArg,

    /// Embedding model (provider default when omitted)
    #[arg(long, env = "RAGCHAT_EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Embedding dimension override (OpenAI models only)
    #[arg(long, env = "RAGCHAT_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Attempts per embedding request, retrying rate limits and transient errors
    #[arg(long, env = "RAGCHAT_EMBEDDING_MAX_ATTEMPTS", default_value_t = 1)]
    pub embedding_max_attempts: usize,

    /// Query embeddings kept in memory (0 disables caching)
    #[arg(long, env = "RAGCHAT_EMBEDDING_CACHE", default_value_t = 256)]
    pub embedding_cache_size: usize,

    /// Language-model provider
    #[arg(long, env = "RAGCHAT_LLM_PROVIDER", value_enum, default_value = "gemini")]
    pub llm_provider: LlmProviderArg,

    /// Language model (provider default when omitted)
    #[arg(long, env = "RAGCHAT_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Base URL for the Gemini REST API
    #[arg(long, env = "RAGCHAT_GEMINI_BASE", default_value = GEMINI_BASE_URL)]
    pub gemini_base_url: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(long, env = "RAGCHAT_OPENAI_BASE", default_value = OPENAI_BASE_URL)]
    pub openai_base_url: String,

    /// Sampling temperature (provider default when omitted)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate per call
    #[arg(long, default_value_t = 1024)]
    pub max_output_tokens: usize,

    /// Knowledge domain the assistant is framed around
    #[arg(long, env = "RAGCHAT_DOMAIN", default_value = DEFAULT_DOMAIN)]
    pub domain: String,

    /// Exact reply when the answer is not in the retrieved context
    #[arg(long, env = "RAGCHAT_REFUSAL", default_value = DEFAULT_REFUSAL)]
    pub refusal: String,

    /// Passages retrieved per question
    #[arg(long, env = "RAGCHAT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Most recent turns sent to the model (all when omitted)
    #[arg(long, env = "RAGCHAT_MAX_HISTORY_TURNS")]
    pub max_history_turns: Option<usize>,

    /// Handling of matches without text metadata
    #[arg(long, env = "RAGCHAT_MALFORMED_MATCHES", value_enum, default_value = "skip")]
    pub malformed_matches: MalformedMatchPolicy,

    /// Seconds before a remote call times out
    #[arg(long, env = "RAGCHAT_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// Print a preview of the retrieved context each turn
    #[arg(long, default_value_t = false)]
    pub show_context: bool,

    /// Log debug output to stderr (overridden by RUST_LOG)
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Where the Pinecone index lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexLocation {
    /// Data-plane host known up front.
    Host(String),
    /// Index name to resolve through the control plane.
    Name(String),
}

/// Validated configuration. Holds credentials, so it is not `Debug`.
#[derive(Clone)]
pub struct Settings {
    embedding_provider: EmbeddingProviderArg,
    embedding_key: String,
    embedding_model: String,
    embedding_dimensions: Option<usize>,
    embedding_max_attempts: usize,
    embedding_cache: Option<NonZeroUsize>,
    llm_provider: LlmProviderArg,
    llm_key: String,
    llm_model: String,
    gemini_base_url: String,
    openai_base_url: String,
    pinecone_key: String,
    pinecone_control_plane: String,
    index: IndexLocation,
    namespace: Option<String>,
    /// Prompt framing.
    pub prompts: PromptTemplates,
    /// Sampling for both model calls.
    pub sampling: Sampling,
    /// Neighbours per query.
    pub top_k: NonZeroUsize,
    /// Turns sent to the model per call.
    pub history_window: Option<usize>,
    /// Malformed match handling.
    pub malformed_matches: MalformedMatchPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Whether the REPL prints context previews.
    pub show_context: bool,
}

impl Cli {
    /// Validates the parsed flags into [`Settings`].
    pub fn settings(&self) -> Result<Settings, RagError> {
        let pinecone_key = required(&self.pinecone_api_key, "PINECONE_API_KEY")?;
        let index = match (
            non_blank(&self.pinecone_index_host),
            non_blank(&self.pinecone_index_name),
        ) {
            (Some(host), _) => IndexLocation::Host(host),
            (None, Some(name)) => IndexLocation::Name(name),
            (None, None) => {
                return Err(RagError::config(
                    "PINECONE_INDEX_HOST or PINECONE_INDEX_NAME must be set",
                ))
            }
        };

        let embedding_key = match self.embedding_provider {
            EmbeddingProviderArg::Gemini => required(&self.gemini_api_key, "GEMINI_API_KEY")?,
            EmbeddingProviderArg::Openai => required(&self.openai_api_key, "OPENAI_API_KEY")?,
        };
        let llm_key = match self.llm_provider {
            LlmProviderArg::Gemini => required(&self.gemini_api_key, "GEMINI_API_KEY")?,
            LlmProviderArg::Openai => required(&self.openai_api_key, "OPENAI_API_KEY")?,
            LlmProviderArg::Anthropic => {
                required(&self.anthropic_api_key, "ANTHROPIC_API_KEY")?
            }
        };

        let top_k = NonZeroUsize::new(self.top_k)
            .ok_or_else(|| RagError::config("--top-k must be at least 1"))?;
        if self.max_history_turns == Some(0) {
            return Err(RagError::config("--max-history-turns must be at least 1"));
        }
        if self.domain.trim().is_empty() {
            return Err(RagError::config("--domain cannot be empty"));
        }
        if self.refusal.trim().is_empty() {
            return Err(RagError::config("--refusal cannot be empty"));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RagError::config("--temperature must be between 0 and 2"));
            }
        }
        if self.max_output_tokens == 0 {
            return Err(RagError::config("--max-output-tokens must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(RagError::config("--timeout-secs must be at least 1"));
        }

        Ok(Settings {
            embedding_provider: self.embedding_provider,
            embedding_key,
            embedding_model: non_blank(&self.embedding_model)
                .unwrap_or_else(|| self.embedding_provider.default_model().to_string()),
            embedding_dimensions: self.embedding_dimensions,
            embedding_max_attempts: self.embedding_max_attempts.max(1),
            embedding_cache: NonZeroUsize::new(self.embedding_cache_size),
            llm_provider: self.llm_provider,
            llm_key,
            llm_model: non_blank(&self.llm_model)
                .unwrap_or_else(|| self.llm_provider.default_model().to_string()),
            gemini_base_url: self.gemini_base_url.clone(),
            openai_base_url: self.openai_base_url.clone(),
            pinecone_key,
            pinecone_control_plane: self.pinecone_control_plane.clone(),
            index,
            namespace: non_blank(&self.pinecone_namespace),
            prompts: PromptTemplates::new(self.domain.trim(), self.refusal.trim()),
            sampling: Sampling {
                temperature: self.temperature,
                max_tokens: self.max_output_tokens,
            },
            top_k,
            history_window: self.max_history_turns,
            malformed_matches: self.malformed_matches,
            timeout: Duration::from_secs(self.timeout_secs),
            show_context: self.show_context,
        })
    }
}

impl Settings {
    /// Where the index will be looked up.
    pub fn index_location(&self) -> &IndexLocation {
        &self.index
    }

    /// Selected language model identifier.
    pub fn llm_model(&self) -> &str {
        &self.llm_model
    }

    /// Selected embedding model identifier.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    /// Builds the service clients and a fresh session around them.
    pub async fn connect(&self) -> Result<RagSession, RagError> {
        let embedder = self.embedder()?;
        let index = self.vector_index().await?;
        let llm = self.llm()?;
        Ok(RagSession::new(
            QueryRewriter::new(
                Arc::clone(&llm),
                &self.prompts,
                self.sampling,
                self.history_window,
            ),
            Retriever::new(embedder, index, self.top_k, self.malformed_matches),
            AnswerGenerator::new(
                llm,
                self.prompts.clone(),
                self.sampling,
                self.history_window,
            ),
        ))
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>, RagError> {
        let embedder: Arc<dyn Embedder> = match self.embedding_provider {
            EmbeddingProviderArg::Gemini => Arc::new(
                GeminiEmbedder::new(
                    &self.embedding_key,
                    &self.gemini_base_url,
                    &self.embedding_model,
                    self.timeout,
                    self.embedding_max_attempts,
                )
                .map_err(config_error)?,
            ),
            EmbeddingProviderArg::Openai => Arc::new(
                OpenAiEmbedder::new(
                    &self.embedding_key,
                    &self.openai_base_url,
                    self.embedding_model.clone(),
                    self.embedding_dimensions,
                    self.timeout,
                    self.embedding_max_attempts,
                )
                .map_err(config_error)?,
            ),
        };
        Ok(match self.embedding_cache {
            Some(capacity) => Arc::new(CachedEmbedder::new(embedder, capacity)),
            None => embedder,
        })
    }

    async fn vector_index(&self) -> Result<Arc<dyn VectorIndex>, RagError> {
        let host = match &self.index {
            IndexLocation::Host(host) => host.clone(),
            IndexLocation::Name(name) => PineconeIndex::resolve_host(
                &self.pinecone_key,
                &self.pinecone_control_plane,
                name,
                self.timeout,
            )
            .await
            .map_err(config_error)?,
        };
        debug!(%host, namespace = ?self.namespace, "using Pinecone index");
        let index = PineconeIndex::new(
            &self.pinecone_key,
            &host,
            self.namespace.clone(),
            self.timeout,
        )
        .map_err(config_error)?;
        Ok(Arc::new(index))
    }

    fn llm(&self) -> Result<Arc<dyn LlmProvider>, RagError> {
        let model = self.llm_model.clone();
        Ok(match self.llm_provider {
            LlmProviderArg::Gemini => Arc::new(
                GeminiProvider::new(&self.llm_key, &self.gemini_base_url, model, self.timeout)
                    .map_err(config_error)?,
            ),
            LlmProviderArg::Openai => Arc::new(
                OpenAiProvider::new(&self.llm_key, &self.openai_base_url, model, self.timeout)
                    .map_err(config_error)?,
            ),
            LlmProviderArg::Anthropic => Arc::new(
                AnthropicProvider::new(&self.llm_key, model, self.timeout)
                    .map_err(config_error)?,
            ),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn required(value: &Option<String>, name: &str) -> Result<String, RagError> {
    non_blank(value).ok_or_else(|| RagError::config(format!("{name} must be set")))
}

fn config_error(err: anyhow::Error) -> RagError {
    RagError::config(format!("{err:#}"))
}
