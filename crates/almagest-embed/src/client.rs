//! Document-level embedding over chunked text.

use std::sync::Arc;

use almagest_core::{Error, Result};
use tracing::debug;

use crate::chunker::{DEFAULT_MAX_CHUNK_BYTES, split_by_bytes};
use crate::provider::{Embedding, EmbeddingProvider};

/// Embedding client that folds multi-chunk documents into one vector.
#[derive(Clone)]
pub struct EmbeddingClient {
    /// Provider performing the raw text-to-vector calls.
    provider: Arc<dyn EmbeddingProvider>,
    /// Chunk byte budget for document text.
    max_chunk_bytes: usize,
}

impl EmbeddingClient {
    /// Creates a client over the given provider with the default chunk budget.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
        }
    }

    /// Sets the chunk byte budget.
    #[must_use]
    pub fn with_max_chunk_bytes(mut self, max_chunk_bytes: usize) -> Self {
        self.max_chunk_bytes = max_chunk_bytes;
        self
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Embed a whole document body into a single vector.
    ///
    /// The text is chunked to the byte budget, each chunk is embedded in
    /// order with one provider call, and the chunk vectors are averaged
    /// component-wise into the document vector.
    ///
    /// # Errors
    /// Returns an error if any chunk embedding fails, or if the provider
    /// returns vectors of differing lengths mid-document
    pub async fn embed_document(&self, text: &str) -> Result<Embedding> {
        let chunks = split_by_bytes(text, self.max_chunk_bytes);
        debug!(
            "Embedding document: {} bytes in {} chunk(s) via {}",
            text.len(),
            chunks.len(),
            self.provider.name()
        );

        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            vectors.push(self.provider.embed(chunk).await?);
        }

        mean_vector(&vectors)
    }

    /// Embed a short query string with a single provider call, no chunking.
    ///
    /// # Errors
    /// Returns an error if the provider call fails
    pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
        self.provider.embed(text).await
    }
}

/// Component-wise arithmetic mean of chunk vectors.
///
/// An empty input yields an empty vector. A length mismatch between chunk
/// vectors means the provider changed behavior mid-document and is fatal.
fn mean_vector(vectors: &[Embedding]) -> Result<Embedding> {
    let Some(first) = vectors.first() else {
        return Ok(Embedding::default());
    };
    let dimension = first.len();

    for vector in vectors {
        if vector.len() != dimension {
            return Err(Error::Provider(format!(
                "chunk vector length changed mid-document: expected {dimension}, got {}",
                vector.len()
            )));
        }
    }

    let mut sums = vec![0.0_f64; dimension];
    for vector in vectors {
        for (sum, component) in sums.iter_mut().zip(vector) {
            *sum += component;
        }
    }

    let count = vectors.len() as f64;
    Ok(sums.into_iter().map(|sum| sum / count).collect())
}
