//! Core data model for documents and their embedding references.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of components in every stored embedding vector.
///
/// Fixed by the embedding model; both `text-embedding-004` and
/// `nomic-embed-text` emit 768-dimensional vectors. Vectors of any other
/// length are rejected at index-build time.
pub const EMBEDDING_DIMENSION: usize = 768;

/// Internally generated identifier for a stored document record.
///
/// Assigned when the document is first inserted and stable across patches.
/// Distinct from the caller-supplied external identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Creates a new random document ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque weak handle to an embedding record.
///
/// A document holds one of these purely for lookup; the embedding's lifecycle
/// is independent and the handle may resolve to nothing after the embedding
/// is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingRef(Uuid);

impl EmbeddingRef {
    /// Creates a new random embedding reference
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EmbeddingRef {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EmbeddingRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored research document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Internally generated storage id, stable across patches.
    pub id: DocumentId,
    /// Caller-supplied stable identifier; the de-duplication key.
    pub external_id: String,
    /// Document title.
    pub title: String,
    /// Ordered author names; empty when unknown.
    pub authors: Vec<String>,
    /// Free-form publication date text.
    pub publication_date: Option<String>,
    /// Publication year.
    pub year: Option<i32>,
    /// Source-file reference, relative to the corpus root.
    pub path: Option<String>,
    /// Abstract or summary text.
    pub summary: Option<String>,
    /// Secondary human-assigned identifier (e.g. a zero-padded code).
    pub number: Option<String>,
    /// Weak link to the document's embedding record.
    pub embedding_ref: Option<EmbeddingRef>,
}

/// Field set accepted by an upsert.
///
/// `title` is required; optional fields left as `None` never overwrite a
/// previously stored value. `authors` follows the same rule at this boundary
/// even though the stored document always carries an author list.
#[derive(Debug, Clone)]
pub struct DocumentFields {
    /// Document title, required.
    pub title: String,
    /// Ordered author names.
    pub authors: Option<Vec<String>>,
    /// Free-form publication date text.
    pub publication_date: Option<String>,
    /// Publication year.
    pub year: Option<i32>,
    /// Source-file reference.
    pub path: Option<String>,
    /// Abstract or summary text.
    pub summary: Option<String>,
    /// Secondary human-assigned identifier.
    pub number: Option<String>,
}

impl DocumentFields {
    /// Creates a field set with the given title and nothing else.
    pub fn new<T: Into<String>>(title: T) -> Self {
        Self {
            title: title.into(),
            authors: None,
            publication_date: None,
            year: None,
            path: None,
            summary: None,
            number: None,
        }
    }

    /// Sets the author list.
    #[must_use]
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Sets the publication date text.
    #[must_use]
    pub fn with_publication_date<T: Into<String>>(mut self, date: T) -> Self {
        self.publication_date = Some(date.into());
        self
    }

    /// Sets the publication year.
    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Sets the source-file reference.
    #[must_use]
    pub fn with_path<T: Into<String>>(mut self, path: T) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the summary text.
    #[must_use]
    pub fn with_summary<T: Into<String>>(mut self, summary: T) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the secondary identifier.
    #[must_use]
    pub fn with_number<T: Into<String>>(mut self, number: T) -> Self {
        self.number = Some(number.into());
        self
    }
}

/// Partial field set applied by a metadata backfill.
///
/// Only fields explicitly set are patched; the embedding is never touched.
#[derive(Debug, Clone)]
pub struct DocumentPatch {
    /// External id of the document to patch.
    pub external_id: String,
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement author list.
    pub authors: Option<Vec<String>>,
    /// Replacement publication date text.
    pub publication_date: Option<String>,
    /// Replacement publication year.
    pub year: Option<i32>,
    /// Replacement summary text.
    pub summary: Option<String>,
    /// Replacement secondary identifier.
    pub number: Option<String>,
}

impl DocumentPatch {
    /// Creates an empty patch for the given external id.
    pub fn new<T: Into<String>>(external_id: T) -> Self {
        Self {
            external_id: external_id.into(),
            title: None,
            authors: None,
            publication_date: None,
            year: None,
            summary: None,
            number: None,
        }
    }

    /// Sets the replacement title.
    #[must_use]
    pub fn with_title<T: Into<String>>(mut self, title: T) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the replacement author list.
    #[must_use]
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Sets the replacement publication date text.
    #[must_use]
    pub fn with_publication_date<T: Into<String>>(mut self, date: T) -> Self {
        self.publication_date = Some(date.into());
        self
    }

    /// Sets the replacement publication year.
    #[must_use]
    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    /// Sets the replacement summary text.
    #[must_use]
    pub fn with_summary<T: Into<String>>(mut self, summary: T) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Sets the replacement secondary identifier.
    #[must_use]
    pub fn with_number<T: Into<String>>(mut self, number: T) -> Self {
        self.number = Some(number.into());
        self
    }

    /// Returns `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.authors.is_none()
            && self.publication_date.is_none()
            && self.year.is_none()
            && self.summary.is_none()
            && self.number.is_none()
    }
}

/// Lightweight projection of a document for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Internally generated storage id.
    pub id: DocumentId,
    /// Caller-supplied stable identifier.
    pub external_id: String,
    /// Document title.
    pub title: String,
    /// Secondary human-assigned identifier.
    pub number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(DocumentId::new(), DocumentId::new());
        assert_ne!(EmbeddingRef::new(), EmbeddingRef::new());
    }

    #[test]
    fn test_id_display_round_trip() {
        let id = DocumentId::new();
        let text = id.to_string();
        assert_eq!(text.len(), 36, "expected hyphenated UUID, got {text}");
    }

    #[test]
    fn test_fields_builder() {
        let fields = DocumentFields::new("Bone Loss Study")
            .with_authors(vec!["A. Lee".to_owned()])
            .with_year(2024)
            .with_number("042");

        assert_eq!(fields.title, "Bone Loss Study");
        assert_eq!(fields.authors, Some(vec!["A. Lee".to_owned()]));
        assert_eq!(fields.year, Some(2024));
        assert_eq!(fields.number, Some("042".to_owned()));
        assert!(fields.publication_date.is_none());
        assert!(fields.summary.is_none());
    }

    #[test]
    fn test_patch_is_empty() {
        let empty = DocumentPatch::new("042");
        assert!(empty.is_empty());

        let patch = DocumentPatch::new("042").with_title("Bone Loss Study");
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_document_serde_round_trip() {
        let document = Document {
            id: DocumentId::new(),
            external_id: "042".to_owned(),
            title: "Bone Loss Study".to_owned(),
            authors: vec!["A. Lee".to_owned()],
            publication_date: None,
            year: Some(2024),
            path: Some("042.md".to_owned()),
            summary: None,
            number: Some("042".to_owned()),
            embedding_ref: Some(EmbeddingRef::new()),
        };

        let json = serde_json::to_string(&document).unwrap_or_else(|error| {
            panic!("serialize failed: {error}");
        });
        let decoded: Document = serde_json::from_str(&json).unwrap_or_else(|error| {
            panic!("deserialize failed: {error}");
        });
        assert_eq!(document, decoded);
    }
}
