use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash as _, Hasher as _};
use std::sync::{Arc, Mutex, PoisonError};

use almagest_core::Result;
use async_trait::async_trait;

use super::{Embedding, EmbeddingProvider};

/// Mock embedding provider with deterministic output.
///
/// Returns a hash-derived vector for any text unless a canned response was
/// registered for that exact text. Every call is recorded so tests can assert
/// on call order and count. Also usable from the CLI for offline smoke runs.
pub struct MockProvider {
    /// Canned responses keyed by exact input text.
    responses: Arc<Mutex<HashMap<String, Embedding>>>,
    /// Texts embedded so far, in call order.
    call_history: Arc<Mutex<Vec<String>>>,
    /// Dimension of hash-derived vectors.
    dimension: usize,
}

impl MockProvider {
    /// Creates a mock emitting vectors of the production dimension.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
            dimension: almagest_core::EMBEDDING_DIMENSION,
        }
    }

    /// Sets the dimension of hash-derived vectors.
    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Registers a canned vector for an exact input text.
    #[must_use]
    pub fn with_response<T: Into<String>>(self, text: T, embedding: Embedding) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text.into(), embedding);
        self
    }

    /// Returns every text embedded so far, in call order.
    pub fn call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the number of embed calls made.
    pub fn call_count(&self) -> usize {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Clears the recorded call history.
    pub fn clear_history(&self) {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Deterministic hash-derived embedding for the given text.
    fn hash_embedding(&self, text: &str) -> Embedding {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let hash = hasher.finish();

        let mut vector = Vec::with_capacity(self.dimension);
        for index in 0..self.dimension {
            let value = ((hash.wrapping_add(index as u64)) % 1000) as f64 / 1000.0;
            vector.push(value);
        }
        vector
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(text.to_owned());

        let canned = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(text)
            .cloned();

        Ok(canned.unwrap_or_else(|| self.hash_embedding(text)))
    }
}
