
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::IndexedDocument;
use crate::embeddings::ChunkingConfig;

/// Bounded LRU of built document indexes, keyed by document content and the
/// settings that shaped the index.
pub struct DocumentIndexCache {
    entries: Mutex<LruCache<String, Arc<IndexedDocument>>>,
}

impl DocumentIndexCache {
    /// `None` when `capacity` is zero
    #[inline]
    pub fn new(capacity: usize) -> Option<Self> {
        NonZeroUsize::new(capacity).map(|capacity| Self {
            entries: Mutex::new(LruCache::new(capacity)),
        })
    }

    #[inline]
    pub fn key(model_id: &str, chunking: &ChunkingConfig, document_text: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(model_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(&(chunking.chunk_size as u64).to_le_bytes());
        hasher.update(&(chunking.overlap as u64).to_le_bytes());
        hasher.update(document_text.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    #[inline]
    pub async fn get(&self, key: &str) -> Option<Arc<IndexedDocument>> {
        let hit = self.entries.lock().await.get(key).map(Arc::clone);
        debug!(
            "Document index cache {}",
            if hit.is_some() { "hit" } else { "miss" }
        );
        hit
    }

    #[inline]
    pub async fn put(&self, key: String, document: Arc<IndexedDocument>) {
        self.entries.lock().await.put(key, document);
    }

    #[inline]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    #[inline]
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
