//! Corpus ingestion pipeline.
//!
//! Batches a directory of text files through the embedding client and into
//! the document store: read in parallel, embed per document up to a
//! concurrency bound, upsert, checkpoint. Upsert idempotence makes a retry
//! of a failed batch safe.

use futures::stream::{FuturesUnordered, StreamExt as _};
use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use walkdir::WalkDir;

use almagest_core::{DocumentFields, Error, Result};
use almagest_embed::{Embedding, EmbeddingClient};

use crate::SharedStore;
use crate::metadata::{MetadataEntry, MetadataTable};

/// Default number of documents committed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default bound on concurrently embedded documents within one batch.
pub const DEFAULT_EMBED_CONCURRENCY: usize = 4;

/// Bound on concurrent corpus file reads within one batch.
const MAX_CONCURRENT_READS: usize = 16;

/// Progress callback for ingestion stages.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, Option<u64>) + Send + Sync>;

/// One corpus file prepared for embedding.
type IngestJob = (String, DocumentFields, String);

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Corpus files discovered.
    pub files_found: usize,
    /// Documents upserted.
    pub documents_ingested: usize,
    /// Batches committed and checkpointed.
    pub batches_committed: usize,
}

/// Batch ingestion of a corpus directory into the document store.
pub struct IngestionPipeline {
    /// Embedding client shared across documents.
    client: EmbeddingClient,
    /// Store receiving the upserts.
    store: SharedStore,
    /// Documents per committed batch.
    batch_size: usize,
    /// Concurrently embedded documents within a batch.
    embed_concurrency: usize,
    /// Optional progress callback.
    progress_callback: Option<ProgressCallback>,
}

impl IngestionPipeline {
    /// Create a pipeline with default batching parameters.
    pub fn new(client: EmbeddingClient, store: SharedStore) -> Self {
        Self {
            client,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            embed_concurrency: DEFAULT_EMBED_CONCURRENCY,
            progress_callback: None,
        }
    }

    /// Set the number of documents committed per batch (floored to 1).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the embedding concurrency bound (floored to 1).
    #[must_use]
    pub fn with_embed_concurrency(mut self, embed_concurrency: usize) -> Self {
        self.embed_concurrency = embed_concurrency.max(1);
        self
    }

    /// Set a progress callback for ingestion stages.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress if a callback is set
    fn report_progress(&self, stage: &str, current: u64, total: Option<u64>) {
        if let Some(callback) = &self.progress_callback {
            callback(stage, current, total);
        }
    }

    /// Ingest every `.md` file under `corpus_root`.
    ///
    /// Files are processed in sorted path order, in batches. Each batch is
    /// read in parallel, embedded up to the concurrency bound, upserted one
    /// document at a time, and checkpointed to the store snapshot. A failed
    /// read or embedding aborts the run at its batch boundary; batches
    /// committed before it stay committed.
    ///
    /// # Errors
    /// Returns an error if the corpus root is not a directory, a corpus file
    /// cannot be read, an embedding call fails, or an upsert is rejected
    pub async fn run(
        &self,
        corpus_root: &Path,
        metadata: Option<&MetadataTable>,
    ) -> Result<IngestReport> {
        if !corpus_root.is_dir() {
            return Err(Error::Validation(format!(
                "corpus root {} is not a directory",
                corpus_root.display()
            )));
        }
        if metadata.is_none() {
            warn!("No metadata table provided, using filename-derived defaults");
        }

        let files = collect_corpus_files(corpus_root);
        let total = files.len();
        info!("Ingesting {total} corpus file(s) from {}", corpus_root.display());
        self.report_progress("Ingesting", 0, Some(total as u64));

        let mut report = IngestReport {
            files_found: total,
            ..IngestReport::default()
        };

        for batch in files.chunks(self.batch_size) {
            let contents = read_batch(corpus_root, batch).await?;

            let jobs = contents
                .into_iter()
                .map(|(relative_path, text)| {
                    let external_id = external_id_for(&relative_path);
                    let entry = metadata.and_then(|table| table.get(&external_id));
                    let fields = document_fields(&external_id, &relative_path, entry);
                    (external_id, fields, text)
                })
                .collect();

            let embedded = self.embed_batch(jobs).await?;

            {
                let mut store = self.store.write().await;
                for (external_id, fields, vector) in embedded {
                    store.upsert(&external_id, fields, vector)?;
                    report.documents_ingested += 1;
                }
                // Checkpoint so a later failure never loses this batch
                store.save().await?;
            }

            report.batches_committed += 1;
            info!(
                "  Batch {} committed ({}/{total} document(s))",
                report.batches_committed, report.documents_ingested
            );
            self.report_progress(
                "Ingesting",
                report.documents_ingested as u64,
                Some(total as u64),
            );
        }

        info!(
            "✓ Ingested {} document(s) in {} batch(es)",
            report.documents_ingested, report.batches_committed
        );
        Ok(report)
    }

    /// Embed one batch of prepared jobs, bounded by the concurrency setting.
    ///
    /// Documents are embedded concurrently; chunks within each document stay
    /// sequential inside [`EmbeddingClient::embed_document`]. The first
    /// failure aborts the whole batch, never leaving a document with a
    /// degraded vector.
    async fn embed_batch(
        &self,
        jobs: Vec<IngestJob>,
    ) -> Result<Vec<(String, DocumentFields, Embedding)>> {
        let mut tasks: FuturesUnordered<JoinHandle<(usize, IngestJob, Result<Embedding>)>> =
            FuturesUnordered::new();
        let mut job_iter = jobs.into_iter().enumerate();
        let mut embedded = Vec::new();

        let spawn_job = |(position, (external_id, fields, text)): (usize, IngestJob)| {
            let client = self.client.clone();
            tokio::spawn(async move {
                let vector = client.embed_document(&text).await;
                (position, (external_id, fields, text), vector)
            })
        };

        // Start the initial window
        for _ in 0..self.embed_concurrency {
            if let Some(job) = job_iter.next() {
                tasks.push(spawn_job(job));
            }
        }

        // Refill as tasks finish to keep the window full
        while let Some(joined) = tasks.next().await {
            let (position, (external_id, fields, _text), vector) = joined
                .map_err(|error| Error::Other(format!("Task join error: {error}")))?;
            embedded.push((position, external_id, fields, vector?));

            if let Some(job) = job_iter.next() {
                tasks.push(spawn_job(job));
            }
        }

        // Restore batch order so upserts land in corpus order
        embedded.sort_by_key(|(position, ..)| *position);
        Ok(embedded
            .into_iter()
            .map(|(_, external_id, fields, vector)| (external_id, fields, vector))
            .collect())
    }
}

/// Collect the relative paths of every `.md` file under the corpus root,
/// sorted for a deterministic batch order.
fn collect_corpus_files(corpus_root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(corpus_root)
        .into_iter()
        .filter_map(StdResult::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|extension| extension.eq_ignore_ascii_case("md"))
        })
        .map(|entry| {
            entry
                .path()
                .strip_prefix(corpus_root)
                .map_or_else(|_| entry.path().to_path_buf(), Path::to_path_buf)
        })
        .collect();
    files.sort();
    files
}

/// Read a batch of corpus files with bounded parallelism.
///
/// Results come back in batch order. Any unreadable file fails the whole
/// batch; a document must never be silently dropped from the corpus.
async fn read_batch(corpus_root: &Path, files: &[PathBuf]) -> Result<Vec<(PathBuf, String)>> {
    let mut tasks = FuturesUnordered::new();
    let mut file_iter = files.iter().cloned().enumerate();
    let mut contents = Vec::with_capacity(files.len());

    let spawn_read = |(position, relative_path): (usize, PathBuf)| {
        let absolute_path = corpus_root.join(&relative_path);
        tokio::spawn(async move {
            let text = tokio::fs::read_to_string(&absolute_path).await;
            (position, relative_path, text)
        })
    };

    for _ in 0..MAX_CONCURRENT_READS {
        if let Some(file) = file_iter.next() {
            tasks.push(spawn_read(file));
        }
    }

    while let Some(joined) = tasks.next().await {
        let (position, relative_path, text) =
            joined.map_err(|error| Error::Other(format!("Task join error: {error}")))?;
        let text = text.map_err(|error| {
            Error::Other(format!(
                "Failed to read corpus file {}: {error}",
                relative_path.display()
            ))
        })?;
        contents.push((position, relative_path, text));

        if let Some(file) = file_iter.next() {
            tasks.push(spawn_read(file));
        }
    }

    contents.sort_by_key(|(position, ..)| *position);
    Ok(contents
        .into_iter()
        .map(|(_, relative_path, text)| (relative_path, text))
        .collect())
}

/// Derive the external id from a corpus file path (the file stem).
fn external_id_for(relative_path: &Path) -> String {
    relative_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Build the upsert field set for one corpus file.
///
/// The metadata entry supplies what it has; a missing or empty title falls
/// back to the external id so every file still produces a document.
fn document_fields(
    external_id: &str,
    relative_path: &Path,
    entry: Option<&MetadataEntry>,
) -> DocumentFields {
    let title = entry
        .and_then(|entry| entry.title.clone())
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| external_id.to_owned());

    let mut fields =
        DocumentFields::new(title).with_path(relative_path.to_string_lossy().into_owned());
    if let Some(entry) = entry {
        if let Some(authors) = entry.authors.clone() {
            fields = fields.with_authors(authors);
        }
        if let Some(publication_date) = entry.publication_date.clone() {
            fields = fields.with_publication_date(publication_date);
        }
        if let Some(year) = entry.year {
            fields = fields.with_year(year);
        }
        if let Some(summary) = entry.summary.clone() {
            fields = fields.with_summary(summary);
        }
    }
    fields
}
