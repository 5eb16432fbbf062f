
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Embedder, Embedding};
use crate::database::KeyValueStore;
use crate::{RagError, Result};

const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(60);

/// Content-addressed embedding cache.
///
/// Keys are `"{model_id}:{blake3(text)}"` so a model change misses instead of
/// mixing vector spaces. Values are the vector packed as little-endian `f32`.
/// Entries are never invalidated.
///
/// There is no single-flight protection: concurrent misses for the same text
/// each call the embedder and each write the (identical) result. Compute is
/// at-least-once, not exactly-once.
pub struct EmbeddingCache {
    store: Arc<dyn KeyValueStore>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
    stats: CacheStats,
}

/// Running counters for one cache instance
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    store_failures: AtomicU64,
}

impl CacheStats {
    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }
}

impl EmbeddingCache {
    #[inline]
    pub fn new(store: Arc<dyn KeyValueStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            timeout: DEFAULT_EMBED_TIMEOUT,
            stats: CacheStats::default(),
        }
    }

    /// Bound every call to the embedder; an expired call fails with [`RagError::Embedding`]
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    #[inline]
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Cache key for `text` under the current embedding model
    #[inline]
    pub fn fingerprint(&self, text: &str) -> String {
        fingerprint(self.embedder.model_id(), text)
    }

    #[inline]
    pub async fn get_or_compute(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.get_or_compute_many(&[text]).await?;
        embeddings.pop().ok_or_else(|| {
            RagError::Embedding("Embedder returned no vector for the input".to_string())
        })
    }

    /// Embed `texts` in order, computing only what the store does not already hold.
    ///
    /// Distinct missing texts are sent to the embedder in a single call. Store
    /// failures are logged and absorbed.
    pub async fn get_or_compute_many(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let keys = texts
            .iter()
            .map(|text| self.fingerprint(text))
            .collect::<Vec<_>>();

        let lookups = join_all(keys.iter().map(|key| self.lookup(key))).await;

        let mut results: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut pending: HashMap<&str, usize> = HashMap::new();
        let mut missing_texts: Vec<String> = Vec::new();
        let mut missing_keys: Vec<&str> = Vec::new();

        for ((text, key), cached) in texts.iter().zip(&keys).zip(lookups) {
            if cached.is_none() && !pending.contains_key(key.as_str()) {
                pending.insert(key.as_str(), missing_texts.len());
                missing_texts.push((*text).to_string());
                missing_keys.push(key.as_str());
            }
            results.push(cached);
        }

        let hits = results.iter().filter(|r| r.is_some()).count();
        self.stats.hits.fetch_add(hits as u64, Ordering::Relaxed);
        self.stats
            .misses
            .fetch_add(missing_texts.len() as u64, Ordering::Relaxed);

        debug!(
            "Embedding cache: {} lookups, {} hits, {} distinct misses",
            texts.len(),
            hits,
            missing_texts.len()
        );

        if missing_texts.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        let computed = self.compute(&missing_texts).await?;

        join_all(
            missing_keys
                .iter()
                .zip(&computed)
                .map(|(key, embedding)| self.store_best_effort(key, embedding)),
        )
        .await;

        Ok(results
            .into_iter()
            .zip(&keys)
            .map(|(cached, key)| {
                cached.unwrap_or_else(|| computed[pending[key.as_str()]].clone())
            })
            .collect())
    }

    async fn compute(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let embedded = tokio::time::timeout(self.timeout, self.embedder.embed(texts))
            .await
            .map_err(|_| {
                RagError::Embedding(format!(
                    "Embedding {} texts timed out after {:?}",
                    texts.len(),
                    self.timeout
                ))
            })?
            .map_err(|e| RagError::Embedding(format!("{e:#}")))?;

        if embedded.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embedded.len()
            )));
        }

        Ok(embedded)
    }

    async fn lookup(&self, key: &str) -> Option<Embedding> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => {
                let decoded = decode_embedding(&bytes);
                if decoded.is_none() {
                    warn!(
                        "Ignoring undecodable cache entry {} ({} bytes)",
                        key,
                        bytes.len()
                    );
                }
                decoded
            }
            Ok(None) => None,
            Err(e) => {
                self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Embedding cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    async fn store_best_effort(&self, key: &str, embedding: &[f32]) {
        if let Err(e) = self.store.set(key, &encode_embedding(embedding)).await {
            self.stats.store_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Embedding cache write failed for {}: {:#}", key, e);
        }
    }
}

/// Namespaced content hash used as the cache key
#[inline]
pub fn fingerprint(model_id: &str, text: &str) -> String {
    format!("{}:{}", model_id, blake3::hash(text.as_bytes()).to_hex())
}

#[inline]
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode packed little-endian `f32`s; `None` for empty or misaligned input
#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Option<Embedding> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }

    Some(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}
