//! Keyed document and embedding storage with idempotent upsert semantics.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use almagest_core::{
    Document, DocumentFields, DocumentId, DocumentPatch, DocumentSummary, EMBEDDING_DIMENSION,
    EmbeddingRef, Error, Result,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::index::{SearchHit, VectorIndex};
use crate::persistence::{SnapshotFile, StoreSnapshot};

/// The vector half of one stored document.
///
/// Kept as a separate record so the vector index operates over a
/// homogeneous, metadata-free collection while document metadata stays cheap
/// to patch independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Stable identity of this record; the owning document holds it as a
    /// weak link.
    pub id: EmbeddingRef,
    /// External id of the owning document.
    pub external_id: String,
    /// The embedding vector.
    pub vector: Vec<f64>,
}

/// Durable keyed storage for documents and their embeddings.
///
/// Documents are keyed by caller-supplied external id; each document may
/// reference one embedding record. Writes keep the nearest-neighbor index
/// and the secondary indexes consistent, and mark the store dirty until the
/// next snapshot save.
pub struct DocumentStore {
    /// Snapshot persistence.
    snapshot: SnapshotFile,
    /// Documents by external id, in insertion order.
    documents: IndexMap<String, Document>,
    /// Embedding records by external id.
    embeddings: HashMap<String, EmbeddingRecord>,
    /// Secondary index: embedding reference to owning external id.
    by_ref: HashMap<EmbeddingRef, String>,
    /// Secondary index: document number to external ids (non-unique).
    by_number: HashMap<String, Vec<String>>,
    /// Nearest-neighbor index over the embedding vectors.
    index: VectorIndex,
    /// Set when in-memory state is ahead of the on-disk snapshot.
    dirty: AtomicBool,
}

impl DocumentStore {
    /// Open a store at the given snapshot path with the production vector
    /// dimension.
    ///
    /// # Errors
    /// Returns an error if an existing snapshot cannot be read or carries a
    /// different format version or dimension
    pub async fn open(path: PathBuf) -> Result<Self> {
        Self::open_with_dimension(path, EMBEDDING_DIMENSION).await
    }

    /// Open a store accepting vectors of a specific dimension.
    ///
    /// A missing snapshot file yields a fresh empty store. An existing
    /// snapshot is decoded and the secondary indexes and vector index are
    /// rebuilt from it; any stored vector of the wrong length fails the
    /// load.
    ///
    /// # Errors
    /// Returns an error if the snapshot cannot be read or decoded, carries a
    /// different format version, or was built with a different dimension
    pub async fn open_with_dimension(path: PathBuf, dimension: usize) -> Result<Self> {
        let snapshot_file = SnapshotFile::new(path);
        let mut store = Self {
            snapshot: snapshot_file,
            documents: IndexMap::new(),
            embeddings: HashMap::default(),
            by_ref: HashMap::default(),
            by_number: HashMap::default(),
            index: VectorIndex::new(dimension),
            dirty: AtomicBool::new(false),
        };

        let Some(snapshot) = store.snapshot.load().await? else {
            debug!("No store snapshot at {}, starting empty", store.snapshot.path().display());
            return Ok(store);
        };

        if snapshot.dimension != dimension {
            return Err(Error::Config(format!(
                "store snapshot was built with dimension {}, expected {dimension}",
                snapshot.dimension
            )));
        }

        for record in snapshot.embeddings {
            store.index.upsert(record.id, record.vector.clone())?;
            store.by_ref.insert(record.id, record.external_id.clone());
            store.embeddings.insert(record.external_id.clone(), record);
        }

        for document in snapshot.documents {
            if let Some(number) = &document.number {
                store
                    .by_number
                    .entry(number.clone())
                    .or_default()
                    .push(document.external_id.clone());
            }
            store
                .documents
                .insert(document.external_id.clone(), document);
        }

        debug!(
            "Loaded store snapshot: {} document(s), {} embedding(s)",
            store.documents.len(),
            store.embeddings.len()
        );
        Ok(store)
    }

    /// Path of the backing snapshot file.
    pub fn path(&self) -> &Path {
        self.snapshot.path()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of stored embedding records.
    pub fn embedding_count(&self) -> usize {
        self.embeddings.len()
    }

    /// Vector dimension this store accepts.
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Insert or update one document and its embedding.
    ///
    /// The embedding is written first: an existing record keeps its identity
    /// and has its vector overwritten in place, a missing one is created.
    /// The document is then inserted or patched; optional fields left unset
    /// never overwrite previously stored values, and the embedding reference
    /// is re-attached on every call to heal a dangling link. Calling twice
    /// with identical input leaves the same state (idempotent).
    ///
    /// # Errors
    /// Returns a validation error for an empty external id or title, or a
    /// configuration error for a vector of the wrong dimension; the store is
    /// unchanged in both cases
    pub fn upsert(
        &mut self,
        external_id: &str,
        fields: DocumentFields,
        vector: Vec<f64>,
    ) -> Result<()> {
        if external_id.trim().is_empty() {
            return Err(Error::Validation(
                "document external id must not be empty".to_owned(),
            ));
        }
        if fields.title.trim().is_empty() {
            return Err(Error::Validation(format!(
                "document {external_id} is missing required field title"
            )));
        }
        if vector.len() != self.index.dimension() {
            return Err(Error::Config(format!(
                "vector dimension mismatch for {external_id}: expected {}, got {}",
                self.index.dimension(),
                vector.len()
            )));
        }

        debug!("Upserting document {external_id}");

        // Embedding first, so the document never references a record that
        // was not committed.
        let embedding_ref = match self.embeddings.get_mut(external_id) {
            Some(record) => {
                record.vector.clone_from(&vector);
                record.id
            }
            None => {
                let record = EmbeddingRecord {
                    id: EmbeddingRef::new(),
                    external_id: external_id.to_owned(),
                    vector: vector.clone(),
                };
                let id = record.id;
                self.by_ref.insert(id, external_id.to_owned());
                self.embeddings.insert(external_id.to_owned(), record);
                id
            }
        };
        self.index.upsert(embedding_ref, vector)?;

        let (previous_number, current_number) =
            if let Some(document) = self.documents.get_mut(external_id) {
                let previous = document.number.clone();
                document.title = fields.title;
                if let Some(authors) = fields.authors {
                    document.authors = authors;
                }
                if let Some(publication_date) = fields.publication_date {
                    document.publication_date = Some(publication_date);
                }
                if let Some(year) = fields.year {
                    document.year = Some(year);
                }
                if let Some(path) = fields.path {
                    document.path = Some(path);
                }
                if let Some(summary) = fields.summary {
                    document.summary = Some(summary);
                }
                if let Some(number) = fields.number {
                    document.number = Some(number);
                }
                document.embedding_ref = Some(embedding_ref);
                (previous, document.number.clone())
            } else {
                let document = Document {
                    id: DocumentId::new(),
                    external_id: external_id.to_owned(),
                    title: fields.title,
                    authors: fields.authors.unwrap_or_default(),
                    publication_date: fields.publication_date,
                    year: fields.year,
                    path: fields.path,
                    summary: fields.summary,
                    number: fields.number,
                    embedding_ref: Some(embedding_ref),
                };
                let number = document.number.clone();
                self.documents.insert(external_id.to_owned(), document);
                (None, number)
            };

        if previous_number != current_number {
            self.reindex_number(external_id, previous_number.as_deref(), current_number.as_deref());
        }

        self.dirty.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Patch already-stored documents with the fields each patch provides.
    ///
    /// Unknown external ids are skipped silently, embeddings are never
    /// touched, and empty patches are ignored. Returns the number of
    /// documents actually patched.
    pub fn backfill_metadata(&mut self, patches: &[DocumentPatch]) -> usize {
        let mut patched = 0;

        for patch in patches {
            if patch.is_empty() {
                continue;
            }
            let Some(document) = self.documents.get_mut(&patch.external_id) else {
                debug!("backfill: no document for {}, skipping", patch.external_id);
                continue;
            };

            let previous_number = document.number.clone();
            if let Some(title) = &patch.title {
                document.title.clone_from(title);
            }
            if let Some(authors) = &patch.authors {
                document.authors.clone_from(authors);
            }
            if let Some(publication_date) = &patch.publication_date {
                document.publication_date = Some(publication_date.clone());
            }
            if let Some(year) = patch.year {
                document.year = Some(year);
            }
            if let Some(summary) = &patch.summary {
                document.summary = Some(summary.clone());
            }
            if let Some(number) = &patch.number {
                document.number = Some(number.clone());
            }
            let current_number = document.number.clone();

            if previous_number != current_number {
                self.reindex_number(
                    &patch.external_id,
                    previous_number.as_deref(),
                    current_number.as_deref(),
                );
            }
            patched += 1;
        }

        if patched > 0 {
            self.dirty.store(true, Ordering::Relaxed);
        }
        patched
    }

    /// Look up one document by external id.
    pub fn get(&self, external_id: &str) -> Option<&Document> {
        self.documents.get(external_id)
    }

    /// Look up documents by their secondary number (non-unique).
    pub fn find_by_number(&self, number: &str) -> Vec<&Document> {
        self.by_number
            .get(number)
            .map(|ids| {
                ids.iter()
                    .filter_map(|external_id| self.documents.get(external_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Lightweight projection of every document, in storage order.
    pub fn list_summaries(&self) -> Vec<DocumentSummary> {
        self.documents
            .values()
            .map(|document| DocumentSummary {
                id: document.id,
                external_id: document.external_id.clone(),
                title: document.title.clone(),
                number: document.number.clone(),
            })
            .collect()
    }

    /// Resolve embedding references to their owning documents.
    ///
    /// References with no owning document are skipped, not errors. The
    /// output carries no order contract relative to the input; callers that
    /// need ranked output re-sort against their ranking.
    pub fn resolve_by_embedding_refs(&self, refs: &[EmbeddingRef]) -> Vec<Document> {
        refs.iter()
            .filter_map(|embedding_ref| {
                self.by_ref
                    .get(embedding_ref)
                    .and_then(|external_id| self.documents.get(external_id))
                    .cloned()
            })
            .collect()
    }

    /// Search the vector index.
    ///
    /// `limit` is clamped to `[1, 256]` per the index contract.
    pub fn search(&self, query_vector: &[f64], limit: usize) -> Vec<SearchHit> {
        self.index.search(query_vector, limit)
    }

    /// Remove a document's embedding record without touching the document.
    ///
    /// The document's reference is left dangling; resolution simply skips it
    /// until the next upsert re-attaches a live record. Returns `false` when
    /// no embedding exists for the id.
    pub fn remove_embedding(&mut self, external_id: &str) -> bool {
        let Some(record) = self.embeddings.remove(external_id) else {
            return false;
        };
        self.by_ref.remove(&record.id);
        self.index.remove(record.id);
        self.dirty.store(true, Ordering::Relaxed);
        true
    }

    /// Whether in-memory state is ahead of the on-disk snapshot.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Write the current state to the snapshot file.
    ///
    /// # Errors
    /// Returns an error if encoding or the file write fails
    pub async fn save(&self) -> Result<()> {
        self.snapshot.save(self.to_snapshot()).await?;
        self.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Blocking variant of [`Self::save`], used on drop.
    ///
    /// # Errors
    /// Returns an error if encoding or the file write fails
    pub fn save_sync(&self) -> Result<()> {
        self.snapshot.save_sync(&self.to_snapshot())?;
        self.dirty.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Snapshot of the current state.
    fn to_snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: StoreSnapshot::VERSION,
            dimension: self.index.dimension(),
            documents: self.documents.values().cloned().collect(),
            embeddings: self.embeddings.values().cloned().collect(),
        }
    }

    /// Move an external id between number-index buckets.
    fn reindex_number(&mut self, external_id: &str, previous: Option<&str>, current: Option<&str>) {
        if let Some(number) = previous
            && let Some(ids) = self.by_number.get_mut(number)
        {
            ids.retain(|id| id != external_id);
            if ids.is_empty() {
                self.by_number.remove(number);
            }
        }
        if let Some(number) = current {
            self.by_number
                .entry(number.to_owned())
                .or_default()
                .push(external_id.to_owned());
        }
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        if self.dirty.load(Ordering::Relaxed)
            && let Err(error) = self.save_sync()
        {
            warn!("Failed to save store snapshot on drop: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_dir() -> TempDir {
        TempDir::new().unwrap_or_else(|error| panic!("Failed to create temp dir: {error}"))
    }

    async fn empty_store(dir: &TempDir) -> DocumentStore {
        DocumentStore::open_with_dimension(dir.path().join("store.bin"), 2)
            .await
            .unwrap_or_else(|error| panic!("Failed to open store: {error}"))
    }

    fn base_fields() -> DocumentFields {
        DocumentFields::new("Bone Loss Study")
            .with_authors(vec!["A. Lee".to_owned()])
            .with_path("042.md")
    }

    #[tokio::test]
    async fn upsert_creates_document_and_embedding() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store.upsert("042", base_fields(), vec![1.0, 1.0]).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.embedding_count(), 1);

        let document = store.get("042").expect("document should exist");
        assert_eq!(document.title, "Bone Loss Study");
        assert_eq!(document.authors, vec!["A. Lee".to_owned()]);
        assert_eq!(document.path, Some("042.md".to_owned()));
        assert!(document.embedding_ref.is_some());
    }

    #[tokio::test]
    async fn upsert_twice_with_identical_input_is_idempotent() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store.upsert("042", base_fields(), vec![1.0, 1.0]).unwrap();
        let first = store.get("042").cloned().expect("document should exist");

        store.upsert("042", base_fields(), vec![1.0, 1.0]).unwrap();
        let second = store.get("042").cloned().expect("document should exist");

        assert_eq!(store.len(), 1);
        assert_eq!(store.embedding_count(), 1);
        assert_eq!(first, second, "second identical upsert must change nothing");
    }

    #[tokio::test]
    async fn reingestion_overwrites_vector_but_keeps_reference() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();
        let original_ref = store.get("042").and_then(|document| document.embedding_ref);

        store.upsert("042", base_fields(), vec![0.0, 1.0]).unwrap();
        let updated_ref = store.get("042").and_then(|document| document.embedding_ref);

        assert_eq!(original_ref, updated_ref, "reference must survive re-ingestion");

        let hits = store.search(&[0.0, 1.0], 1);
        assert!((hits[0].score - 1.0).abs() < 1e-12, "index must see the new vector");
    }

    #[tokio::test]
    async fn partial_update_preserves_unset_fields() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store
            .upsert(
                "042",
                DocumentFields::new("A").with_authors(vec!["A. Lee".to_owned()]),
                vec![1.0, 0.0],
            )
            .unwrap();
        store
            .upsert("042", DocumentFields::new("B").with_year(2024), vec![1.0, 0.0])
            .unwrap();

        let document = store.get("042").expect("document should exist");
        assert_eq!(document.title, "B");
        assert_eq!(document.year, Some(2024));
        assert_eq!(
            document.authors,
            vec!["A. Lee".to_owned()],
            "unset authors must not be overwritten"
        );
    }

    #[tokio::test]
    async fn validation_failures_leave_the_store_untouched() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        let empty_title = store.upsert("042", DocumentFields::new("  "), vec![1.0, 0.0]);
        assert!(matches!(empty_title, Err(Error::Validation(_))));

        let empty_id = store.upsert("", base_fields(), vec![1.0, 0.0]);
        assert!(matches!(empty_id, Err(Error::Validation(_))));

        let bad_dimension = store.upsert("042", base_fields(), vec![1.0, 0.0, 0.0]);
        assert!(matches!(bad_dimension, Err(Error::Config(_))));

        assert!(store.is_empty());
        assert_eq!(store.embedding_count(), 0);
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn backfill_patches_only_provided_fields() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();

        let patches = vec![
            DocumentPatch::new("042")
                .with_year(2021)
                .with_number("042")
                .with_summary("microgravity bone loss"),
        ];
        let patched = store.backfill_metadata(&patches);

        assert_eq!(patched, 1);
        let document = store.get("042").expect("document should exist");
        assert_eq!(document.title, "Bone Loss Study", "title must be untouched");
        assert_eq!(document.year, Some(2021));
        assert_eq!(document.number, Some("042".to_owned()));
        assert_eq!(document.summary, Some("microgravity bone loss".to_owned()));

        let by_number = store.find_by_number("042");
        assert_eq!(by_number.len(), 1);
        assert_eq!(by_number[0].external_id, "042");
    }

    #[tokio::test]
    async fn backfill_unknown_id_is_a_silent_noop() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();
        let before = store.get("042").cloned();

        let patches = vec![DocumentPatch::new("missing-999").with_title("X")];
        let patched = store.backfill_metadata(&patches);

        assert_eq!(patched, 0);
        assert_eq!(store.get("042").cloned(), before);
        assert!(store.get("missing-999").is_none());
    }

    #[tokio::test]
    async fn backfill_ignores_empty_patches() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();

        let patched = store.backfill_metadata(&[DocumentPatch::new("042")]);
        assert_eq!(patched, 0);
    }

    #[tokio::test]
    async fn backfill_never_touches_the_embedding() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();

        store.backfill_metadata(&[DocumentPatch::new("042").with_year(2020)]);

        let hits = store.search(&[1.0, 0.0], 1);
        assert!((hits[0].score - 1.0).abs() < 1e-12);
        assert_eq!(store.embedding_count(), 1);
    }

    #[tokio::test]
    async fn list_summaries_projects_in_insertion_order() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store
            .upsert("b", DocumentFields::new("Second").with_number("002"), vec![1.0, 0.0])
            .unwrap();
        store
            .upsert("a", DocumentFields::new("First"), vec![0.0, 1.0])
            .unwrap();

        let summaries = store.list_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].external_id, "b");
        assert_eq!(summaries[0].title, "Second");
        assert_eq!(summaries[0].number, Some("002".to_owned()));
        assert_eq!(summaries[1].external_id, "a");
        assert_eq!(summaries[1].number, None);
    }

    #[tokio::test]
    async fn resolve_skips_unknown_references() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();

        let live = store
            .get("042")
            .and_then(|document| document.embedding_ref)
            .expect("reference should exist");
        let dangling = EmbeddingRef::new();

        let documents = store.resolve_by_embedding_refs(&[dangling, live]);
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].external_id, "042");
    }

    #[tokio::test]
    async fn removed_embedding_orphans_then_upsert_heals() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();

        let old_ref = store
            .get("042")
            .and_then(|document| document.embedding_ref)
            .expect("reference should exist");

        assert!(store.remove_embedding("042"));
        assert!(!store.remove_embedding("042"), "second removal finds nothing");

        // The document survives with a dangling reference
        assert!(store.get("042").is_some());
        assert!(store.resolve_by_embedding_refs(&[old_ref]).is_empty());
        assert!(store.search(&[1.0, 0.0], 5).is_empty());

        // Re-ingestion attaches a fresh, resolvable record
        store.upsert("042", base_fields(), vec![1.0, 0.0]).unwrap();
        let new_ref = store
            .get("042")
            .and_then(|document| document.embedding_ref)
            .expect("reference should exist");
        assert_ne!(new_ref, old_ref);
        assert_eq!(store.resolve_by_embedding_refs(&[new_ref]).len(), 1);
    }

    #[tokio::test]
    async fn find_by_number_is_non_unique() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store
            .upsert("a", DocumentFields::new("First").with_number("042"), vec![1.0, 0.0])
            .unwrap();
        store
            .upsert("b", DocumentFields::new("Second").with_number("042"), vec![0.0, 1.0])
            .unwrap();

        let matches = store.find_by_number("042");
        assert_eq!(matches.len(), 2);
        assert!(store.find_by_number("999").is_empty());
    }

    #[tokio::test]
    async fn number_reindexing_follows_updates() {
        let dir = temp_dir();
        let mut store = empty_store(&dir).await;

        store
            .upsert("a", DocumentFields::new("First").with_number("001"), vec![1.0, 0.0])
            .unwrap();
        store.backfill_metadata(&[DocumentPatch::new("a").with_number("002")]);

        assert!(store.find_by_number("001").is_empty());
        assert_eq!(store.find_by_number("002").len(), 1);
    }
}
