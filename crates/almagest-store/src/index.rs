//! Nearest-neighbor search over stored embedding vectors.

use std::cmp::Ordering;
use std::collections::HashMap;

use almagest_core::{EmbeddingRef, Error, Result};

/// Smallest limit a search will honor.
pub const MIN_SEARCH_LIMIT: usize = 1;
/// Largest limit a search will honor.
pub const MAX_SEARCH_LIMIT: usize = 256;

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Reference to the matched embedding record.
    pub embedding_ref: EmbeddingRef,
    /// Similarity score, higher is closer.
    pub score: f64,
}

/// In-memory nearest-neighbor index over embedding vectors.
///
/// Maintained incrementally on every write and rebuilt when a snapshot is
/// loaded, so a query never observes an index older than the latest
/// committed write.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    /// Required vector dimension.
    dimension: usize,
    /// Indexed vectors by embedding reference.
    entries: HashMap<EmbeddingRef, Vec<f64>>,
}

impl VectorIndex {
    /// Creates an empty index accepting vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: HashMap::default(),
        }
    }

    /// Dimension this index accepts.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace the vector for a reference.
    ///
    /// # Errors
    /// Returns a configuration error if the vector's length does not match
    /// the index dimension; nothing is inserted in that case
    pub fn upsert(&mut self, embedding_ref: EmbeddingRef, vector: Vec<f64>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::Config(format!(
                "vector dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        self.entries.insert(embedding_ref, vector);
        Ok(())
    }

    /// Remove the vector for a reference, if present.
    pub fn remove(&mut self, embedding_ref: EmbeddingRef) {
        self.entries.remove(&embedding_ref);
    }

    /// Search for the nearest vectors by cosine similarity.
    ///
    /// `limit` is clamped to `[1, 256]`; out-of-range values are accepted
    /// and clamped, never rejected. Results are ranked by descending score.
    pub fn search(&self, query_vector: &[f64], limit: usize) -> Vec<SearchHit> {
        let limit = limit.clamp(MIN_SEARCH_LIMIT, MAX_SEARCH_LIMIT);

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|(embedding_ref, vector)| SearchHit {
                embedding_ref: *embedding_ref,
                score: cosine_similarity(query_vector, vector),
            })
            .collect();

        hits.sort_by(|first, second| {
            second
                .score
                .partial_cmp(&first.score)
                .unwrap_or(Ordering::Equal)
        });
        hits.truncate(limit);
        hits
    }
}

/// Calculate cosine similarity between two vectors
fn cosine_similarity(vector_a: &[f64], vector_b: &[f64]) -> f64 {
    if vector_a.len() != vector_b.len() {
        return 0.0;
    }

    let dot_product: f64 = vector_a
        .iter()
        .zip(vector_b.iter())
        .map(|(x, y)| x * y)
        .sum();
    let magnitude_a = vector_a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let magnitude_b = vector_b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
