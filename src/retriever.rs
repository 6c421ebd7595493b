//! Embeds a standalone query and assembles the grounding context from the index.

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::embedder::Embedder;
use crate::vector_store::{IndexMatch, VectorIndex};

/// Separator placed between consecutive passages.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";
/// Default number of neighbours requested per query.
pub const DEFAULT_TOP_K: usize = 10;
const PREVIEW_CHARS: usize = 200;

/// What to do with a match that has no string `metadata.text`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MalformedMatchPolicy {
    /// Leave the match out of the context and log it.
    #[default]
    Skip,
    /// Fail the retrieval.
    Fail,
}

/// Context text for one turn plus bookkeeping for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedContext {
    /// Passages joined by [`CONTEXT_DELIMITER`].
    pub text: String,
    /// Number of passages included.
    pub passages: usize,
    /// Matches dropped because they carried no text.
    pub skipped: usize,
}

/// Stateless embed-then-search stage.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: NonZeroUsize,
    policy: MalformedMatchPolicy,
}

impl Retriever {
    /// Creates a retriever asking the index for `top_k` neighbours.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: NonZeroUsize,
        policy: MalformedMatchPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            policy,
        }
    }

    /// Neighbours requested per query.
    pub fn top_k(&self) -> usize {
        self.top_k.get()
    }

    /// Embeds `query`, fetches the nearest passages and joins their text.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .context("failed to embed query")?;
        debug!(dims = vector.len(), "embedded standalone query");

        let matches = self
            .index
            .query(&vector, self.top_k.get())
            .await
            .context("vector index query failed")?;
        debug!(
            matches = matches.len(),
            top_scores = ?matches.iter().take(3).map(|m| m.score).collect::<Vec<_>>(),
            "vector index returned matches"
        );

        let context = assemble_context(&matches, self.policy)?;
        debug!(
            length = context.text.len(),
            preview = %preview(&context.text),
            "assembled retrieval context"
        );
        Ok(context)
    }
}

/// Joins the text of each match in the order given.
pub fn assemble_context(
    matches: &[IndexMatch],
    policy: MalformedMatchPolicy,
) -> Result<RetrievedContext> {
    let mut passages = Vec::with_capacity(matches.len());
    let mut skipped = 0usize;
    for (rank, m) in matches.iter().enumerate() {
        match (m.text(), policy) {
            (Some(text), _) => passages.push(text),
            (None, MalformedMatchPolicy::Skip) => {
                skipped += 1;
                warn!(rank, id = %m.id, "match has no text metadata; skipping");
            }
            (None, MalformedMatchPolicy::Fail) => {
                bail!("match {} (rank {}) has no text metadata", m.id, rank);
            }
        }
    }
    Ok(RetrievedContext {
        text: passages.join(CONTEXT_DELIMITER),
        passages: passages.len(),
        skipped,
    })
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
