//! Command handlers for the almagest binary.
//!
//! Results print to stdout through [`console::Term`]; progress and diagnostics
//! go to stderr via `tracing`. Credential and provider checks run before the
//! store is opened so a bad configuration can never interrupt a run mid-write.

use anyhow::Result;
use console::{Term, style};
use std::path::PathBuf;
use std::str::FromStr as _;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use almagest_core::{AlmagestConfig, Error, ProviderKind};
use almagest_embed::{
    EmbeddingClient, EmbeddingProvider, GeminiProvider, MockProvider, OllamaProvider,
};
use almagest_engine::{BackfillRunner, IngestionPipeline, MetadataTable, QueryService, SharedStore};
use almagest_store::DocumentStore;

/// Run the ingestion pipeline over a corpus directory.
///
/// # Errors
/// Returns an error if the provider cannot be constructed, the metadata table
/// is unreadable, or any batch fails to embed or commit.
pub async fn handle_ingest(
    corpus: PathBuf,
    metadata: Option<PathBuf>,
    store_path: Option<PathBuf>,
    batch_size: Option<usize>,
    provider_override: Option<String>,
) -> Result<()> {
    let term = Term::stdout();
    let config = load_config();
    let client = build_client(&config, provider_override.as_deref()).await?;

    let table = match metadata {
        Some(path) => Some(MetadataTable::load(&path)?),
        None => None,
    };

    let store = open_store(&config, store_path).await?;

    let pipeline = IngestionPipeline::new(client, Arc::clone(&store))
        .with_batch_size(batch_size.unwrap_or(config.ingest.batch_size))
        .with_embed_concurrency(config.ingest.embed_concurrency)
        .with_progress_callback(Arc::new(|stage, done, total| match total {
            Some(total) => info!("{stage}: {done}/{total}"),
            None => info!("{stage}: {done}"),
        }));

    let report = pipeline.run(&corpus, table.as_ref()).await?;

    term.write_line(&format!(
        "{} {} document(s) from {} file(s) in {} batch(es)",
        style("✓ Ingested").green().bold(),
        report.documents_ingested,
        report.files_found,
        report.batches_committed,
    ))?;

    Ok(())
}

/// Run the metadata backfill pass over an already-ingested store.
///
/// # Errors
/// Returns an error if the table is unreadable or the snapshot cannot be saved.
pub async fn handle_backfill(metadata: PathBuf, store_path: Option<PathBuf>) -> Result<()> {
    let term = Term::stdout();
    let config = load_config();
    let table = MetadataTable::load(&metadata)?;
    let store = open_store(&config, store_path).await?;

    let runner = BackfillRunner::new(Arc::clone(&store));
    let patched = runner.run(&table).await?;

    term.write_line(&format!(
        "{} {patched} document(s) patched",
        style("✓ Backfill complete:").green().bold(),
    ))?;

    Ok(())
}

/// Embed one query and print the ranked results.
///
/// # Errors
/// Returns an error if the provider cannot be constructed or the query fails
/// to embed.
pub async fn handle_search(
    query: String,
    limit: Option<usize>,
    store_path: Option<PathBuf>,
    provider_override: Option<String>,
) -> Result<()> {
    let term = Term::stdout();
    let config = load_config();
    let client = build_client(&config, provider_override.as_deref()).await?;
    let store = open_store(&config, store_path).await?;

    let service = QueryService::new(client, Arc::clone(&store));
    let results = service.search(&query, limit).await?;

    if results.is_empty() {
        term.write_line(&format!("{}", style("No matching documents.").dim()))?;
        return Ok(());
    }

    for (index, document) in results.iter().enumerate() {
        let rank = index + 1;
        let heading = match (document.number.as_deref(), document.year) {
            (Some(number), Some(year)) => format!(
                "{rank:>2}. {} {} ({year})",
                style(format!("[{number}]")).cyan(),
                style(&document.title).bold(),
            ),
            (Some(number), None) => format!(
                "{rank:>2}. {} {}",
                style(format!("[{number}]")).cyan(),
                style(&document.title).bold(),
            ),
            (None, Some(year)) => {
                format!("{rank:>2}. {} ({year})", style(&document.title).bold())
            }
            (None, None) => format!("{rank:>2}. {}", style(&document.title).bold()),
        };
        term.write_line(&heading)?;

        if !document.authors.is_empty() {
            term.write_line(&format!("    {}", style(document.authors.join(", ")).dim()))?;
        }
        if let Some(summary) = &document.summary {
            term.write_line(&format!("    {summary}"))?;
        }
    }

    Ok(())
}

/// Print one line per stored document, in ingestion order.
///
/// # Errors
/// Returns an error if the store snapshot cannot be read.
pub async fn handle_list(store_path: Option<PathBuf>) -> Result<()> {
    let term = Term::stdout();
    let config = load_config();
    let store = open_store(&config, store_path).await?;

    let summaries = store.read().await.list_summaries();
    if summaries.is_empty() {
        term.write_line(&format!("{}", style("Store is empty.").dim()))?;
        return Ok(());
    }

    for summary in &summaries {
        let number = summary.number.as_deref().unwrap_or("---");
        term.write_line(&format!(
            "{} {} {}",
            style(format!("[{number}]")).cyan(),
            summary.title,
            style(format!("({})", summary.external_id)).dim(),
        ))?;
    }
    term.write_line(&format!("{} document(s)", summaries.len()))?;

    Ok(())
}

/// Load the configuration, falling back to defaults when unreadable.
fn load_config() -> AlmagestConfig {
    AlmagestConfig::load_or_create().unwrap_or_else(|error| {
        warn!("Failed to load config from ~/.almagest/config.toml: {error}");
        warn!("Using default configuration");
        AlmagestConfig::default()
    })
}

/// Build the embedding client for the selected provider.
///
/// Credential and availability checks happen here, before any store access.
async fn build_client(
    config: &AlmagestConfig,
    provider_override: Option<&str>,
) -> Result<EmbeddingClient> {
    let kind = match provider_override {
        Some(value) => ProviderKind::from_str(value)?,
        None => config.provider,
    };

    let provider: Arc<dyn EmbeddingProvider> = match kind {
        ProviderKind::Gemini => {
            let api_key = config
                .api_key(ProviderKind::Gemini)
                .ok_or_else(|| Error::MissingApiKey("GOOGLE_API_KEY".to_owned()))?;
            Arc::new(
                GeminiProvider::with_api_key_direct(api_key)?
                    .with_model(config.gemini.model.clone()),
            )
        }
        ProviderKind::Ollama => {
            let provider = OllamaProvider::new(config.ollama.host.clone())
                .with_model(config.ollama.model.clone());
            provider.ensure_model_available().await?;
            Arc::new(provider)
        }
        ProviderKind::Mock => Arc::new(MockProvider::new()),
    };

    Ok(EmbeddingClient::new(provider))
}

/// Open the store at the override path, or the configured default.
async fn open_store(
    config: &AlmagestConfig,
    override_path: Option<PathBuf>,
) -> Result<SharedStore> {
    let path = match override_path {
        Some(path) => path,
        None => config.resolve_store_path()?,
    };
    let store = DocumentStore::open(path).await?;
    Ok(Arc::new(RwLock::new(store)))
}
