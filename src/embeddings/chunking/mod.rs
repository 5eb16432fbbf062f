
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// A contiguous word window of a document, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Window words joined by single spaces
    pub text: String,
    /// Position of this chunk in document order
    pub index: usize,
}

impl Chunk {
    #[inline]
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Configuration for word-window chunking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Words per chunk
    pub chunk_size: usize,
    /// Words shared between adjacent chunks, must be smaller than `chunk_size`
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 300,
            overlap: 50,
        }
    }
}

impl ChunkingConfig {
    /// Distance in words between the starts of consecutive windows
    #[inline]
    pub fn stride(&self) -> Result<usize> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }

        if self.overlap >= self.chunk_size {
            return Err(RagError::InvalidConfiguration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(self.chunk_size - self.overlap)
    }
}

/// Split `text` into overlapping windows of `chunk_size` words.
///
/// Windows start at `0, stride, 2 * stride, ...` while the start is still
/// inside the word list, so the tail window may be shorter than `chunk_size`.
#[inline]
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    chunk_with_config(
        text,
        &ChunkingConfig {
            chunk_size,
            overlap,
        },
    )
}

#[inline]
pub fn chunk_with_config(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let stride = config.stride()?;

    let words = text.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let chunks = (0..words.len())
        .step_by(stride)
        .enumerate()
        .map(|(index, start)| {
            let end = (start + config.chunk_size).min(words.len());
            Chunk {
                text: words[start..end].join(" "),
                index,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        "Chunked {} words into {} chunks (size {}, overlap {})",
        words.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    Ok(chunks)
}
