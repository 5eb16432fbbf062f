//! Deterministic doubles for the external collaborators.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::answer::Generator;
use crate::database::KeyValueStore;
use crate::embeddings::{Embedder, Embedding};

/// Bag-of-words embedder: each normalized word bumps one hashed bucket, then
/// the vector is scaled to unit length.
pub(crate) struct HashingEmbedder {
    model: String,
    dimension: usize,
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
}

impl HashingEmbedder {
    pub(crate) fn new(model: &str) -> Self {
        Self::with_dimension(model, 512)
    }

    pub(crate) fn with_dimension(model: &str, dimension: usize) -> Self {
        Self {
            model: model.to_string(),
            dimension,
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub(crate) fn vectorize(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let normalized = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>();
            if normalized.is_empty() {
                continue;
            }
            let hash = blake3::hash(normalized.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

/// Embedder that always fails, as if the model server were unreachable
pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str {
        "failing-embedder"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Embedding>> {
        Err(anyhow!("connection refused"))
    }
}

/// Embedder that returns vectors from a fixed sequence, one per text
pub(crate) struct ScriptedEmbedder {
    pub(crate) vectors: Mutex<Vec<Embedding>>,
}

impl ScriptedEmbedder {
    pub(crate) fn new(vectors: Vec<Embedding>) -> Self {
        Self {
            vectors: Mutex::new(vectors),
        }
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn model_id(&self) -> &str {
        "scripted-embedder"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut vectors = self.vectors.lock().map_err(|_| anyhow!("poisoned"))?;
        if vectors.len() < texts.len() {
            return Err(anyhow!("script exhausted"));
        }
        Ok(vectors.drain(..texts.len()).collect())
    }
}

/// Embedder that never answers within any reasonable timeout
pub(crate) struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    fn model_id(&self) -> &str {
        "stalled-embedder"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![vec![0.0]; texts.len()])
    }
}

/// Generator that records prompts and replies with a canned answer
pub(crate) struct RecordingGenerator {
    answer: String,
    delay: Option<Duration>,
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub(crate) fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delay: None,
            fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new("late answer")
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_id(&self) -> &str {
        "recording-generator"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(anyhow!("quota exceeded"));
        }

        Ok(self.answer.clone())
    }
}

/// Store whose reads and/or writes always fail
#[derive(Default)]
pub(crate) struct FailingStore {
    pub(crate) fail_reads: bool,
    pub(crate) writes_attempted: AtomicUsize,
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        if self.fail_reads {
            Err(anyhow!("database is locked"))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
        self.writes_attempted.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("disk full"))
    }
}

/// In-memory store that counts reads and writes
#[derive(Default)]
pub(crate) struct CountingStore {
    inner: crate::database::MemoryStore,
    gets: AtomicUsize,
    sets: AtomicUsize,
}

impl CountingStore {
    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }
}
