
use std::cmp::Ordering;
use tracing::debug;

use crate::embeddings::{Chunk, Embedding, EmbeddingCache};
use crate::{RagError, Result};

/// Exact nearest-neighbour index over a row-major `[len, dimension]` matrix
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    matrix: Vec<f32>,
}

/// One search hit: the row position and its squared Euclidean distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
}

impl FlatIndex {
    /// Stack `rows` into a flat matrix. Every row must have the same non-zero length.
    #[inline]
    pub fn from_rows(rows: &[Embedding]) -> Result<Self> {
        let Some(first) = rows.first() else {
            return Err(RagError::EmptyDocument);
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(RagError::Embedding(
                "Embedder returned an empty vector".to_string(),
            ));
        }

        let mut matrix = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            if row.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: row.len(),
                });
            }
            matrix.extend_from_slice(row);
        }

        Ok(Self { dimension, matrix })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.matrix.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    #[inline]
    pub fn row(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(self.dimension)?;
        self.matrix.get(start..start + self.dimension)
    }

    /// The `k` rows closest to `query`, nearest first.
    ///
    /// Ordered by `(distance, index)` using `f32::total_cmp`, so equal
    /// distances resolve to the earlier row and the result is reproducible.
    /// `k` is clamped to the number of rows.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut neighbors = self
            .matrix
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(index, row)| Neighbor {
                index,
                distance: squared_euclidean_distance(query, row),
            })
            .collect::<Vec<_>>();

        neighbors.sort_by(compare_neighbors);
        neighbors.truncate(k);

        Ok(neighbors)
    }
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.index.cmp(&b.index))
}

/// Sum of squared component differences. Callers guarantee equal lengths.
#[inline]
pub fn squared_euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = 0.0;
    let n = a.len();
    let mut i = 0;

    // Unrolling 4
    while i + 3 < n {
        let d0 = a[i] - b[i];
        let d1 = a[i + 1] - b[i + 1];
        let d2 = a[i + 2] - b[i + 2];
        let d3 = a[i + 3] - b[i + 3];
        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3;
        i += 4;
    }

    while i < n {
        let d = a[i] - b[i];
        sum += d * d;
        i += 1;
    }

    sum
}

/// A chunked document together with its chunk embeddings and search index.
///
/// Row `i` of the index, `embeddings()[i]` and `chunks()[i]` all describe the
/// same chunk.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    chunks: Vec<Chunk>,
    embeddings: Vec<Embedding>,
    index: FlatIndex,
}

impl IndexedDocument {
    #[inline]
    pub fn index(&self) -> &FlatIndex {
        &self.index
    }

    #[inline]
    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }
}

/// Embeds chunks through the cache and assembles an [`IndexedDocument`]
pub struct IndexBuilder<'a> {
    cache: &'a EmbeddingCache,
}

impl<'a> IndexBuilder<'a> {
    #[inline]
    pub fn new(cache: &'a EmbeddingCache) -> Self {
        Self { cache }
    }

    #[inline]
    pub async fn build(&self, chunks: Vec<Chunk>) -> Result<IndexedDocument> {
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument);
        }

        let texts = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>();
        let embeddings = self.cache.get_or_compute_many(&texts).await?;
        let index = FlatIndex::from_rows(&embeddings)?;

        debug!(
            "Built index over {} chunks ({} dimensions)",
            index.len(),
            index.dimension()
        );

        Ok(IndexedDocument {
            chunks,
            embeddings,
            index,
        })
    }
}
