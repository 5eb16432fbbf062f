// Answer module
// Grounded prompt assembly and the document -> answer pipeline


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::KeyValueStore;
use crate::embeddings::{
    ChunkingConfig, Embedder, EmbeddingCache, OllamaClient, chunk_with_config,
};
use crate::retrieval::{
    DocumentIndexCache, IndexBuilder, IndexedDocument, RetrievalConfig, Retriever,
};
use crate::{RagError, Result};

const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(120);

/// External text-completion service
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Wire shape of a question about a document; both fields are required
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerRequest {
    pub document_text: Option<String>,
    pub query: Option<String>,
}

impl AnswerRequest {
    #[inline]
    pub fn new(document_text: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            document_text: Some(document_text.into()),
            query: Some(query.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerResponse {
    pub answer: String,
}

/// Prompt handed to the generator: retrieved context first, then the question
#[inline]
pub fn build_prompt(context_chunks: &[String], query: &str) -> String {
    format!(
        "Answer the question using only the context below. If the context does not contain the answer, say so.\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        context_chunks.join("\n"),
        query
    )
}

/// Runs the retrieval-augmented pipeline for one (document, question) pair.
///
/// Every request chunks the document and builds a fresh index unless the
/// optional document index cache already holds one for identical content and
/// chunking settings. Chunk and query embeddings go through the
/// [`EmbeddingCache`] either way.
pub struct AnswerComposer {
    cache: Arc<EmbeddingCache>,
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    chunking: ChunkingConfig,
    top_k: usize,
    generation_timeout: Duration,
    document_cache: Option<DocumentIndexCache>,
}

impl AnswerComposer {
    #[inline]
    pub fn new(cache: Arc<EmbeddingCache>, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever: Retriever::new(Arc::clone(&cache)),
            cache,
            generator,
            chunking: ChunkingConfig::default(),
            top_k: RetrievalConfig::default().top_k,
            generation_timeout: DEFAULT_GENERATION_TIMEOUT,
            document_cache: None,
        }
    }

    /// Wire an Ollama-backed composer over `store` using every setting in `config`
    #[inline]
    pub fn from_config(config: &Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        config.chunking.stride()?;
        config.validate()?;

        let client = Arc::new(OllamaClient::new(&config.ollama)?);
        let embedder = Arc::clone(&client) as Arc<dyn Embedder>;
        let cache = Arc::new(
            EmbeddingCache::new(store, embedder).with_timeout(config.ollama.embedding_timeout()),
        );

        Ok(Self::new(cache, client)
            .with_chunking(config.chunking)
            .with_top_k(config.retrieval.top_k)
            .with_generation_timeout(config.ollama.generation_timeout())
            .with_index_cache_capacity(config.retrieval.index_cache_capacity))
    }

    #[inline]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Keep up to `capacity` built indexes in memory; 0 disables the cache
    #[inline]
    pub fn with_index_cache_capacity(mut self, capacity: usize) -> Self {
        self.document_cache = DocumentIndexCache::new(capacity);
        self
    }

    #[inline]
    pub fn embedding_cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Validate a wire request and answer it
    #[inline]
    pub async fn answer_query(&self, request: &AnswerRequest) -> Result<AnswerResponse> {
        let document_text = request
            .document_text
            .as_deref()
            .ok_or_else(|| RagError::InvalidInput("document_text is required".to_string()))?;

        let query = request
            .query
            .as_deref()
            .ok_or_else(|| RagError::InvalidInput("query is required".to_string()))?;

        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }

        let answer = self.compose_answer(query, document_text).await?;
        Ok(AnswerResponse { answer })
    }

    /// Retrieve context for `query` from `document_text` and return the generator's output verbatim
    pub async fn compose_answer(&self, query: &str, document_text: &str) -> Result<String> {
        let document = self.index_document(document_text).await?;

        let context = self
            .retriever
            .retrieve(query, &document, self.top_k)
            .await?;

        let prompt = build_prompt(&context, query);
        debug!(
            "Assembled prompt with {} context chunks ({} bytes)",
            context.len(),
            prompt.len()
        );

        let answer = tokio::time::timeout(self.generation_timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| {
                RagError::Generation(format!(
                    "Generation timed out after {:?}",
                    self.generation_timeout
                ))
            })?
            .map_err(|e| RagError::Generation(format!("{e:#}")))?;

        info!(
            "Answered query against {} chunks with {}",
            document.len(),
            self.generator.model_id()
        );

        Ok(answer)
    }

    async fn index_document(&self, document_text: &str) -> Result<Arc<IndexedDocument>> {
        let chunks = chunk_with_config(document_text, &self.chunking)?;
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument);
        }

        let Some(document_cache) = &self.document_cache else {
            return Ok(Arc::new(IndexBuilder::new(&self.cache).build(chunks).await?));
        };

        let key = DocumentIndexCache::key(self.cache.model_id(), &self.chunking, document_text);
        if let Some(document) = document_cache.get(&key).await {
            return Ok(document);
        }

        let document = Arc::new(IndexBuilder::new(&self.cache).build(chunks).await?);
        document_cache.put(key, Arc::clone(&document)).await;
        Ok(document)
    }
}
