// Embeddings module
// Chunking, the embedding cache and the Ollama client behind the `Embedder` seam

pub mod cache;
pub mod chunking;
pub mod ollama;

use anyhow::Result;
use async_trait::async_trait;

pub use cache::{CacheStats, EmbeddingCache};
pub use chunking::{Chunk, ChunkingConfig, chunk, chunk_with_config};
pub use ollama::OllamaClient;

/// Dense vector for a chunk or query; all vectors from one model share a length
pub type Embedding = Vec<f32>;

/// External embedding model.
///
/// Returns one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the model and version, used to namespace cache keys
    fn model_id(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;
}
