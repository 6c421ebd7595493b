#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use ragchat::{
    AnswerGenerator, Embedder, GenerationRequest, IndexMatch, LlmProvider, MalformedMatchPolicy,
    PromptTemplates, QueryRewriter, RagSession, Retriever, Sampling, Turn, VectorIndex,
};

type Reply = dyn Fn(&GenerationRequest<'_>) -> Result<String> + Send + Sync;

/// Model fake that records every conversation it is sent.
pub struct FakeLlm {
    reply: Box<Reply>,
    pub calls: AtomicUsize,
    pub conversations: Mutex<Vec<Vec<Turn>>>,
}

impl FakeLlm {
    pub fn new(
        reply: impl Fn(&GenerationRequest<'_>) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Box::new(reply),
            calls: AtomicUsize::new(0),
            conversations: Mutex::new(Vec::new()),
        }
    }

    /// Rewrites by echoing the latest question; answers from context when it
    /// mentions `keyword`, otherwise with the exact refusal.
    pub fn grounded(keyword: &'static str) -> Self {
        Self::new(move |request| {
            if let Some(context) = answer_context(request) {
                return Ok(if context.contains(keyword) {
                    format!("Grounded answer about {keyword}.")
                } else {
                    PromptTemplates::default().refusal().to_string()
                });
            }
            Ok(latest_user_text(request))
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FakeLlm {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.conversations
            .lock()
            .unwrap()
            .push(request.conversation.to_vec());
        (self.reply)(request)
    }
}

/// Context passed to an answer call, `None` for rewrite calls.
pub fn answer_context<'a>(request: &GenerationRequest<'a>) -> Option<&'a str> {
    request
        .system_instruction
        .split_once("Context:\n")
        .map(|(_, context)| context)
}

pub fn latest_user_text(request: &GenerationRequest<'_>) -> String {
    request
        .conversation
        .last()
        .map(|turn| turn.text().to_string())
        .unwrap_or_default()
}

pub struct FakeEmbedder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("embedding service returned 429 Too Many Requests");
        }
        Ok(vec![text.len() as f32, 1.0, 0.5])
    }
}

pub struct FakeIndex {
    pub matches: Vec<IndexMatch>,
    pub calls: AtomicUsize,
}

impl FakeIndex {
    pub fn with_passages(passages: &[&str]) -> Self {
        let matches = passages
            .iter()
            .enumerate()
            .map(|(i, text)| {
                IndexMatch::with_text(format!("doc-{i}"), 0.9 - i as f32 * 0.1, *text)
            })
            .collect();
        Self {
            matches,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn query(&self, _vector: &[f32], top_k: usize) -> Result<Vec<IndexMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.matches.iter().take(top_k).cloned().collect())
    }
}

/// Handles kept by tests to inspect what the session called.
pub struct Fakes {
    pub llm: Arc<FakeLlm>,
    pub embedder: Arc<FakeEmbedder>,
    pub index: Arc<FakeIndex>,
}

impl Fakes {
    pub fn new(llm: FakeLlm, embedder: FakeEmbedder, index: FakeIndex) -> Self {
        Self {
            llm: Arc::new(llm),
            embedder: Arc::new(embedder),
            index: Arc::new(index),
        }
    }

    pub fn session(&self) -> RagSession {
        self.session_with_window(None)
    }

    pub fn session_with_window(&self, window: Option<usize>) -> RagSession {
        let prompts = PromptTemplates::default();
        let sampling = Sampling::default();
        RagSession::new(
            QueryRewriter::new(self.llm.clone(), &prompts, sampling, window),
            Retriever::new(
                self.embedder.clone(),
                self.index.clone(),
                NonZeroUsize::new(10).unwrap(),
                MalformedMatchPolicy::Skip,
            ),
            AnswerGenerator::new(self.llm.clone(), prompts, sampling, window),
        )
    }

    pub fn total_calls(&self) -> usize {
        self.llm.calls() + self.embedder.calls() + self.index.calls()
    }
}
