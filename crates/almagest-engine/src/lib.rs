//! Ingestion, backfill, and query orchestration for the almagest search engine.
//!
//! This crate wires the embedding client and the document store together:
//! the ingestion pipeline batch-upserts a corpus, the backfill runner
//! enriches stored metadata from an auxiliary table, and the query service
//! answers free-text searches with ranked documents.

use std::sync::Arc;

use almagest_store::DocumentStore;
use tokio::sync::RwLock;

/// Metadata backfill over ingested documents.
pub mod backfill;
/// Corpus ingestion pipeline.
pub mod ingest;
/// Metadata table loading.
pub mod metadata;
/// Free-text query answering.
pub mod query;

/// Document store shared between the pipeline and the query service.
///
/// Writes (upsert, backfill) take the write guard for a whole operation;
/// queries run read-only under the read guard.
pub type SharedStore = Arc<RwLock<DocumentStore>>;

pub use backfill::{BackfillRunner, derive_number};
pub use ingest::{
    DEFAULT_BATCH_SIZE, DEFAULT_EMBED_CONCURRENCY, IngestReport, IngestionPipeline,
    ProgressCallback,
};
pub use metadata::{MetadataEntry, MetadataTable};
pub use query::{DEFAULT_SEARCH_LIMIT, QueryService};
