//! Embedding providers: the trait plus Gemini, Ollama, and mock implementations.

use almagest_core::Result;
use async_trait::async_trait;

/// Gemini embedding API provider.
pub mod gemini;
/// Deterministic offline provider for tests and smoke runs.
pub mod mock;
/// Local Ollama server provider.
pub mod ollama;

pub use gemini::GeminiProvider;
pub use mock::MockProvider;
pub use ollama::OllamaProvider;

/// A single embedding vector.
pub type Embedding = Vec<f64>;

/// Trait for generating embeddings from text.
///
/// Implementations are injected where embeddings are needed; nothing reads
/// provider credentials from ambient process state at call time.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Generate the embedding vector for one piece of text.
    ///
    /// # Errors
    /// Returns an error if the provider is unreachable, rejects the request,
    /// or returns an empty vector
    async fn embed(&self, text: &str) -> Result<Embedding>;
}
