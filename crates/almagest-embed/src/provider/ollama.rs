use almagest_core::{Error, Result};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::GenerateEmbeddingsRequest;

use super::{Embedding, EmbeddingProvider};

/// Default embedding model served by Ollama (768-dimensional output).
const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Local Ollama embedding provider.
pub struct OllamaProvider {
    /// Ollama API client.
    ollama: Ollama,
    /// Embedding model name.
    model: String,
}

impl OllamaProvider {
    /// Creates a provider against the given server URL.
    pub fn new(host: String) -> Self {
        Self {
            ollama: Ollama::new(host, 11434),
            model: DEFAULT_MODEL.to_owned(),
        }
    }

    /// Sets the embedding model to use.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    /// Ensure the server is reachable and the embedding model is present.
    ///
    /// # Errors
    /// Returns an error if the server cannot be reached or the model has not
    /// been pulled
    pub async fn ensure_model_available(&self) -> Result<()> {
        let models = self.ollama.list_local_models().await.map_err(|error| {
            Error::Provider(format!(
                "failed to connect to Ollama: {error}. Ensure the server is running: ollama serve"
            ))
        })?;

        let model_available = models.iter().any(|model| model.name.contains(&self.model));
        if !model_available {
            return Err(Error::Provider(format!(
                "embedding model '{}' not found. Run: ollama pull {}",
                self.model, self.model
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = GenerateEmbeddingsRequest::new(self.model.clone(), text.to_string().into());

        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| Error::Provider(format!("embedding generation failed: {error}")))?;

        // Ollama returns one embedding per input text; we sent exactly one
        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidResponse("no embeddings returned".to_owned()))?;

        if embedding.is_empty() {
            return Err(Error::InvalidResponse(
                "embedding response contained no values".to_owned(),
            ));
        }

        Ok(embedding.into_iter().map(f64::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_defaults() {
        let provider = OllamaProvider::new("http://localhost:11434".to_owned());
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn model_override() {
        let provider = OllamaProvider::new("http://localhost:11434".to_owned())
            .with_model("mxbai-embed-large".to_owned());
        assert_eq!(provider.model, "mxbai-embed-large");
    }
}
