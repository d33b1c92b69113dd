//! Configuration for provider selection, credentials, and ingestion tuning.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Complete almagest configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct AlmagestConfig {
    /// Which embedding provider to use
    pub provider: ProviderKind,
    /// Path of the store snapshot; defaults to `~/.almagest/store.bin`
    pub store_path: Option<PathBuf>,
    /// Gemini provider settings
    pub gemini: GeminiConfig,
    /// Ollama provider settings
    pub ollama: OllamaConfig,
    /// Ingestion pipeline tuning
    pub ingest: IngestConfig,
}

/// Embedding provider selection.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini embedding API (requires an API key)
    #[default]
    Gemini,
    /// Local Ollama server
    Ollama,
    /// Deterministic offline vectors, for tests and smoke runs
    Mock,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::Ollama => write!(f, "ollama"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            other => Err(Error::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Gemini provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Embedding model name
    pub model: String,
    /// API key; falls back to the `GOOGLE_API_KEY` environment variable
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_owned(),
            api_key: None,
        }
    }
}

/// Ollama provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server base URL
    pub host: String,
    /// Embedding model name
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_owned(),
            model: "nomic-embed-text".to_owned(),
        }
    }
}

/// Ingestion pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Documents per batch
    pub batch_size: usize,
    /// Documents embedded concurrently within a batch
    pub embed_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            embed_concurrency: 4,
        }
    }
}

impl AlmagestConfig {
    /// Get the default config directory path (`~/.almagest`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("could not determine home directory".to_owned()))?;
        Ok(home.join(".almagest"))
    }

    /// Get the default config file path (`~/.almagest/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.almagest/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("failed to read config: {error}")))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|error| Error::Config(format!("failed to parse config: {error}")))?;

        tracing::debug!(
            "Loaded config from {:?}: provider={}, gemini_api_key={}",
            path,
            config.provider,
            if config.gemini.api_key.is_some() {
                "present"
            } else {
                "missing"
            }
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                Error::Config(format!("failed to create config directory: {error}"))
            })?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|error| Error::Config(format!("failed to serialize config: {error}")))?;

        let header = "# Almagest Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| Error::Config(format!("failed to write config: {error}")))?;

        Ok(())
    }

    /// Get the API key for a provider, checking config first, then environment variables.
    ///
    /// Ollama and the mock provider need no credential and always return `None`.
    pub fn api_key(&self, provider: ProviderKind) -> Option<String> {
        match provider {
            ProviderKind::Gemini => self
                .gemini
                .api_key
                .clone()
                .or_else(|| env::var("GOOGLE_API_KEY").ok()),
            ProviderKind::Ollama | ProviderKind::Mock => None,
        }
    }

    /// Resolve the store snapshot path, configured or default.
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined while
    /// falling back to the default location
    pub fn resolve_store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("store.bin")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AlmagestConfig::default();
        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.gemini.model, "text-embedding-004");
        assert_eq!(config.ollama.model, "nomic-embed-text");
        assert_eq!(config.ingest.batch_size, 32);
        assert_eq!(config.ingest.embed_concurrency, 4);
    }

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in [ProviderKind::Gemini, ProviderKind::Ollama, ProviderKind::Mock] {
            let parsed: ProviderKind = kind
                .to_string()
                .parse()
                .unwrap_or_else(|error| panic!("parse failed: {error}"));
            assert_eq!(parsed, kind);
        }

        assert!("galactic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_api_key_loading_from_toml() {
        use std::io::Write as _;
        use tempfile::NamedTempFile;

        let toml_content = r#"
provider = "gemini"

[gemini]
model = "text-embedding-004"
api_key = "test_gemini_key_123"

[ollama]
host = "http://localhost:11434"
model = "nomic-embed-text"

[ingest]
batch_size = 32
embed_concurrency = 4
"#;

        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(toml_content.as_bytes())
            .expect("Failed to write to temp file");

        let config = AlmagestConfig::load_from_file(temp_file.path())
            .expect("Failed to load config from temp file");

        assert_eq!(
            config.gemini.api_key,
            Some("test_gemini_key_123".to_owned())
        );
        assert_eq!(
            config.api_key(ProviderKind::Gemini),
            Some("test_gemini_key_123".to_owned())
        );
        assert_eq!(config.api_key(ProviderKind::Ollama), None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("config.toml");

        let config = AlmagestConfig {
            provider: ProviderKind::Ollama,
            ingest: IngestConfig {
                batch_size: 8,
                embed_concurrency: 2,
            },
            ..AlmagestConfig::default()
        };
        config
            .save_to_file(&path)
            .expect("Failed to save config file");

        let reloaded =
            AlmagestConfig::load_from_file(&path).expect("Failed to reload config file");
        assert_eq!(reloaded.provider, ProviderKind::Ollama);
        assert_eq!(reloaded.ingest.batch_size, 8);
    }

    #[test]
    fn test_store_path_prefers_configured_value() {
        let config = AlmagestConfig {
            store_path: Some(PathBuf::from("/tmp/almagest/store.bin")),
            ..AlmagestConfig::default()
        };
        let path = config.resolve_store_path().expect("store path");
        assert_eq!(path, PathBuf::from("/tmp/almagest/store.bin"));
    }
}
