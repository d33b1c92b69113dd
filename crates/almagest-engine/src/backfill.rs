//! Metadata backfill over already-ingested documents.
//!
//! A second offline pass: derive each document's number from its title,
//! join the metadata table by that number (falling back to the external
//! id), and patch the fields the first ingestion pass could not fill.

use std::sync::LazyLock;

use almagest_core::{DocumentPatch, DocumentSummary, Result};
use regex::Regex;
use tracing::{debug, info};

use crate::SharedStore;
use crate::metadata::MetadataTable;

/// Number of patches applied per store call.
const BACKFILL_BATCH_SIZE: usize = 64;

/// Leading three-digit document number, optionally followed by a `_` or `-`
/// separator that is not part of the number itself.
static NUMBER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"^([0-9]{3})[_-]?") {
        Ok(regex) => regex,
        Err(error) => panic!("Number prefix regex is invalid: {error}"),
    });

/// Derive the three-digit document number from a title, if it has one.
pub fn derive_number(title: &str) -> Option<String> {
    NUMBER_PREFIX
        .captures(title)
        .and_then(|captures| captures.get(1))
        .map(|digits| digits.as_str().to_owned())
}

/// Applies metadata patches to documents already in the store.
pub struct BackfillRunner {
    /// Store whose documents are patched.
    store: SharedStore,
}

impl BackfillRunner {
    /// Create a runner over the given store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Join the metadata table against the stored documents and patch them.
    ///
    /// Documents the table knows nothing about are left alone; re-running
    /// with the same table is a no-op. Embeddings are never touched. Returns
    /// the number of documents patched.
    ///
    /// # Errors
    /// Returns an error if the snapshot checkpoint after patching fails
    pub async fn run(&self, table: &MetadataTable) -> Result<usize> {
        let summaries = { self.store.read().await.list_summaries() };
        info!(
            "Backfilling metadata over {} document(s) from {} table entries",
            summaries.len(),
            table.len()
        );

        let patches: Vec<DocumentPatch> = summaries
            .iter()
            .filter_map(|summary| build_patch(summary, table))
            .collect();

        let mut patched_total = 0;
        if !patches.is_empty() {
            let mut store = self.store.write().await;
            for batch in patches.chunks(BACKFILL_BATCH_SIZE) {
                let patched = store.backfill_metadata(batch);
                debug!("  Backfill batch patched {patched}/{} document(s)", batch.len());
                patched_total += patched;
            }
            if patched_total > 0 {
                store.save().await?;
            }
        }

        info!("✓ Backfill patched {patched_total} document(s)");
        Ok(patched_total)
    }
}

/// Build the patch for one document, or `None` when there is nothing to do.
///
/// The metadata entry is matched by the derived number first, then by the
/// external id. Fields follow the only-missing rules: the title only when
/// the stored one is empty, authors only when the table's list is
/// non-empty, date/year/summary whenever the table provides them, and the
/// derived number whenever it differs from the stored one.
fn build_patch(summary: &DocumentSummary, table: &MetadataTable) -> Option<DocumentPatch> {
    let derived_number = derive_number(&summary.title);
    let entry = derived_number
        .as_deref()
        .and_then(|number| table.get(number))
        .or_else(|| table.get(&summary.external_id));

    let mut patch = DocumentPatch::new(summary.external_id.clone());

    if let Some(number) = derived_number
        && summary.number.as_deref() != Some(number.as_str())
    {
        patch = patch.with_number(number);
    }

    if let Some(entry) = entry {
        if summary.title.trim().is_empty()
            && let Some(title) = entry.title.clone()
        {
            patch = patch.with_title(title);
        }
        if let Some(authors) = entry.authors.clone().filter(|authors| !authors.is_empty()) {
            patch = patch.with_authors(authors);
        }
        if let Some(publication_date) = entry.publication_date.clone() {
            patch = patch.with_publication_date(publication_date);
        }
        if let Some(year) = entry.year {
            patch = patch.with_year(year);
        }
        if let Some(summary_text) = entry.summary.clone() {
            patch = patch.with_summary(summary_text);
        }
    }

    if patch.is_empty() { None } else { Some(patch) }
}
