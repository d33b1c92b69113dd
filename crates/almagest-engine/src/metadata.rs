//! Metadata table loading for ingestion and backfill.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use almagest_core::Result;
use serde::Deserialize;
use tracing::{debug, warn};

/// One row of the auxiliary metadata table.
///
/// The table is a JSON array; both `id`/`externalId` and
/// `publication_date`/`publicationDate` key spellings are accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataEntry {
    /// External id of the document this entry describes.
    #[serde(default, alias = "externalId")]
    pub id: Option<String>,
    /// Document title.
    #[serde(default)]
    pub title: Option<String>,
    /// Ordered author names.
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    /// Free-form publication date text.
    #[serde(default, alias = "publicationDate")]
    pub publication_date: Option<String>,
    /// Publication year.
    #[serde(default)]
    pub year: Option<i32>,
    /// Abstract or summary text.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Metadata entries keyed by external id.
#[derive(Debug, Default)]
pub struct MetadataTable {
    /// Entries by external id.
    entries: HashMap<String, MetadataEntry>,
}

impl MetadataTable {
    /// Load a JSON metadata table from disk.
    ///
    /// A file that exists but does not parse is an error; malformed input is
    /// rejected rather than silently ignored. Entries without an id cannot
    /// be joined to anything and are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let raw: Vec<MetadataEntry> = serde_json::from_str(&text)?;
        debug!("Parsed {} metadata entries from {}", raw.len(), path.display());
        Ok(Self::from_entries(raw))
    }

    /// Build a table from already-parsed entries.
    pub fn from_entries(raw: Vec<MetadataEntry>) -> Self {
        let mut entries = HashMap::with_capacity(raw.len());
        for entry in raw {
            let Some(id) = entry.id.clone() else {
                warn!("Metadata entry without an id skipped (title: {:?})", entry.title);
                continue;
            };
            entries.insert(id, entry);
        }
        Self { entries }
    }

    /// Look up the entry for an external id.
    pub fn get(&self, external_id: &str) -> Option<&MetadataEntry> {
        self.entries.get(external_id)
    }

    /// Number of joinable entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table holds no joinable entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almagest_core::Error;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_both_id_spellings() {
        let json = r#"[
            {"id": "042", "title": "Bone Loss Study"},
            {"externalId": "007", "title": "Radiation Shielding"}
        ]"#;
        let table: Vec<MetadataEntry> = serde_json::from_str(json).unwrap();
        let table = MetadataTable::from_entries(table);

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.get("042").and_then(|entry| entry.title.as_deref()),
            Some("Bone Loss Study")
        );
        assert!(table.get("007").is_some());
    }

    #[test]
    fn parses_both_date_spellings() {
        let json = r#"[
            {"id": "a", "publication_date": "2021-03-01"},
            {"id": "b", "publicationDate": "2022-07-15"}
        ]"#;
        let entries: Vec<MetadataEntry> = serde_json::from_str(json).unwrap();
        let table = MetadataTable::from_entries(entries);

        assert_eq!(
            table.get("a").and_then(|entry| entry.publication_date.as_deref()),
            Some("2021-03-01")
        );
        assert_eq!(
            table.get("b").and_then(|entry| entry.publication_date.as_deref()),
            Some("2022-07-15")
        );
    }

    #[test]
    fn entries_without_an_id_are_skipped() {
        let json = r#"[
            {"title": "Orphan"},
            {"id": "042", "title": "Kept"}
        ]"#;
        let entries: Vec<MetadataEntry> = serde_json::from_str(json).unwrap();
        let table = MetadataTable::from_entries(entries);

        assert_eq!(table.len(), 1);
        assert!(table.get("042").is_some());
    }

    #[test]
    fn malformed_table_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let result = MetadataTable::load(file.path());
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn missing_table_file_is_an_io_error() {
        let result = MetadataTable::load(Path::new("/nonexistent/metadata.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn full_entry_round_trips() {
        let json = r#"[{
            "id": "042",
            "title": "Bone Loss Study",
            "authors": ["A. Lee", "B. Chen"],
            "publicationDate": "2021-03-01",
            "year": 2021,
            "summary": "Microgravity bone density findings."
        }]"#;
        let entries: Vec<MetadataEntry> = serde_json::from_str(json).unwrap();
        let table = MetadataTable::from_entries(entries);

        let entry = table.get("042").unwrap();
        assert_eq!(
            entry.authors.as_deref(),
            Some(&["A. Lee".to_owned(), "B. Chen".to_owned()][..])
        );
        assert_eq!(entry.year, Some(2021));
        assert_eq!(entry.summary.as_deref(), Some("Microgravity bone density findings."));
    }
}
