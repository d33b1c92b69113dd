//! Core types, errors, and configuration for the almagest document search engine.
//!
//! This crate provides the shared data model (documents, embedding references),
//! the error taxonomy, and configuration loading used across the workspace.

/// Configuration loading and provider selection.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Core data model shared across the workspace.
pub mod types;

pub use config::{AlmagestConfig, GeminiConfig, IngestConfig, OllamaConfig, ProviderKind};
pub use error::{Error, Result};
pub use types::{
    Document, DocumentFields, DocumentId, DocumentPatch, DocumentSummary, EMBEDDING_DIMENSION,
    EmbeddingRef,
};
