//! Query embedding clients.

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::http::{is_retryable_error, read_json, retry_backoff, should_retry};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiEmbedder;
pub use openai::OpenAiEmbedder;

/// Turns text into a dense vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedder decorator that memoizes recent query vectors.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    /// Wraps `inner` with an LRU cache holding up to `capacity` queries.
    pub fn new(inner: Arc<dyn Embedder>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().await.get(text).cloned() {
            debug!(dims = hit.len(), "query embedding cache hit");
            return Ok(hit);
        }
        let vector = self.inner.embed_query(text).await?;
        self.cache.lock().await.put(text.to_string(), vector.clone());
        Ok(vector)
    }
}

/// POSTs `body` as JSON, retrying rate limits, server errors and transient
/// transport failures until `max_attempts` is exhausted.
pub(crate) async fn post_with_retry<B, T>(
    client: &Client,
    endpoint: &str,
    body: &B,
    max_attempts: usize,
    service: &str,
) -> Result<T>
where
    B: Serialize + ?Sized + Sync,
    T: DeserializeOwned + Send,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0usize;
    loop {
        match client.post(endpoint).json(body).send().await {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() && should_retry(status) && attempt + 1 < max_attempts {
                    attempt += 1;
                    warn!(%status, attempt, "{service} request failed; retrying");
                    sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return read_json(resp, service).await;
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt + 1 < max_attempts {
                    attempt += 1;
                    warn!(error = %err, attempt, "{service} request failed; retrying");
                    sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(anyhow::Error::new(err).context(format!("failed to call {service}")));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn repeated_queries_hit_the_cache() {
        let inner = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let cached = CachedEmbedder::new(inner.clone(), NonZeroUsize::new(2).unwrap());

        let first = cached.embed_query("what is a graph").await.unwrap();
        let second = cached.embed_query("what is a graph").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);

        cached.embed_query("b").await.unwrap();
        cached.embed_query("c").await.unwrap();
        cached.embed_query("what is a graph").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 4);
    }
}
