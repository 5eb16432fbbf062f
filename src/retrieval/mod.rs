// Retrieval module
// Flat vector index construction and top-k search over a single document

pub mod document_cache;
pub mod index;


use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::embeddings::EmbeddingCache;
use crate::Result;

pub use document_cache::DocumentIndexCache;
pub use index::{FlatIndex, IndexBuilder, IndexedDocument, Neighbor, squared_euclidean_distance};

/// Retrieval settings from the `[retrieval]` config section
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the generator
    pub top_k: usize,
    /// Built document indexes kept in memory; 0 disables the cache
    pub index_cache_capacity: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 3,
            index_cache_capacity: 16,
        }
    }
}

/// A retrieved chunk with its position in the document and distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub index: usize,
    pub text: String,
    pub distance: f32,
}

/// Finds the chunks of an [`IndexedDocument`] closest to a query
pub struct Retriever {
    cache: Arc<EmbeddingCache>,
}

impl Retriever {
    #[inline]
    pub fn new(cache: Arc<EmbeddingCache>) -> Self {
        Self { cache }
    }

    /// Texts of the `top_k` closest chunks, closest first
    #[inline]
    pub async fn retrieve(
        &self,
        query: &str,
        document: &IndexedDocument,
        top_k: usize,
    ) -> Result<Vec<String>> {
        Ok(self
            .retrieve_scored(query, document, top_k)
            .await?
            .into_iter()
            .map(|chunk| chunk.text)
            .collect())
    }

    /// Like [`Retriever::retrieve`], keeping chunk positions and distances.
    ///
    /// `top_k` above the chunk count is clamped and `top_k == 0` returns
    /// nothing without embedding the query.
    pub async fn retrieve_scored(
        &self,
        query: &str,
        document: &IndexedDocument,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 || document.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.cache.get_or_compute(query).await?;
        let neighbors = document.index().search(&query_embedding, top_k)?;

        let retrieved = neighbors
            .into_iter()
            .map(|neighbor| RetrievedChunk {
                index: neighbor.index,
                text: document.chunks()[neighbor.index].text.clone(),
                distance: neighbor.distance,
            })
            .collect::<Vec<_>>();

        for chunk in &retrieved {
            debug!("Retrieved chunk {} (distance {:.4})", chunk.index, chunk.distance);
        }

        Ok(retrieved)
    }
}
