//! Text chunking and document embedding for the almagest search engine.
//!
//! This crate turns document text into fixed-length vectors: long bodies are
//! split into byte-bounded chunks, each chunk is embedded by an injected
//! provider, and the chunk vectors are averaged into one vector per document.

/// Byte-budget text chunking on paragraph boundaries.
pub mod chunker;
/// Document-level embedding client.
pub mod client;
/// Embedding provider trait and implementations.
pub mod provider;

pub use chunker::{DEFAULT_MAX_CHUNK_BYTES, split_by_bytes};
pub use client::EmbeddingClient;
pub use provider::{Embedding, EmbeddingProvider, GeminiProvider, MockProvider, OllamaProvider};
