use almagest_core::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;

use super::{Embedding, EmbeddingProvider};

/// Gemini embedding API base URL.
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Default embedding model for Gemini (768-dimensional output).
const DEFAULT_MODEL: &str = "text-embedding-004";
/// Env var key for the Gemini API key.
const ENV_GOOGLE_API_KEY: &str = "GOOGLE_API_KEY";

/// Google Gemini embedding provider.
#[derive(Debug)]
pub struct GeminiProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Gemini API key.
    api_key: String,
    /// Embedding model name to use.
    model: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the `GOOGLE_API_KEY` environment variable is not set.
    pub fn new() -> Result<Self> {
        let api_key = env::var(ENV_GOOGLE_API_KEY)
            .map_err(|_| Error::MissingApiKey(ENV_GOOGLE_API_KEY.to_owned()))?;

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    /// Creates a new `GeminiProvider` with the given API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided API key is empty.
    pub fn with_api_key_direct(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey(ENV_GOOGLE_API_KEY.to_owned()));
        }

        Ok(Self {
            client: Client::default(),
            api_key,
            model: DEFAULT_MODEL.to_owned(),
        })
    }

    /// Sets the embedding model to use.
    #[must_use]
    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

/// Request payload sent to the Gemini `embedContent` API.
#[derive(Debug, Serialize)]
struct EmbedContentRequest {
    /// Fully qualified model name (`models/<model>`).
    model: String,
    /// Content holding the text to embed.
    content: Content,
}

/// Content wrapper carrying the text parts.
#[derive(Debug, Serialize)]
struct Content {
    /// Text parts of the content.
    parts: Vec<Part>,
}

/// A single text part.
#[derive(Debug, Serialize)]
struct Part {
    /// Raw text to embed.
    text: String,
}

/// Response payload returned by the `embedContent` API.
#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    /// Embedding produced for the content.
    embedding: Option<ContentEmbedding>,
}

/// Embedding vector returned by Gemini.
#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    /// Vector components.
    values: Vec<f64>,
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part {
                    text: text.to_owned(),
                }],
            },
        };

        let response = self
            .client
            .post(format!("{GEMINI_API_URL}/{}:embedContent", self.model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_owned());
            return Err(Error::Provider(format!(
                "Gemini API error {status}: {error_text}"
            )));
        }

        let parsed: EmbedContentResponse = response.json().await.map_err(|error| {
            Error::InvalidResponse(format!("failed to parse Gemini response: {error}"))
        })?;

        parsed
            .embedding
            .map(|embedding| embedding.values)
            .filter(|values| !values.is_empty())
            .ok_or_else(|| {
                Error::InvalidResponse("embedding response contained no values".to_owned())
            })
    }
}
