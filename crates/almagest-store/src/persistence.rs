//! Snapshot persistence for the document store.

use bincode::config::standard as bincode_config;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use almagest_core::{Document, Error, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::task::spawn_blocking;
use tracing::info;

use crate::store::EmbeddingRecord;

/// On-disk image of a [`DocumentStore`](crate::store::DocumentStore).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Format version identifier; mismatches fail the load.
    pub version: u32,
    /// Vector dimension the snapshot was built with.
    pub dimension: usize,
    /// Stored documents in insertion order.
    pub documents: Vec<Document>,
    /// Stored embedding records.
    pub embeddings: Vec<EmbeddingRecord>,
}

impl StoreSnapshot {
    /// Snapshot format version identifier
    pub const VERSION: u32 = 1;

    /// Check if the snapshot format version matches this build
    pub fn is_valid(&self) -> bool {
        self.version == Self::VERSION
    }
}

/// Snapshot file operations.
pub struct SnapshotFile {
    /// Snapshot file path
    path: PathBuf,
}

impl SnapshotFile {
    /// Create snapshot operations for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot from disk.
    ///
    /// Returns `Ok(None)` when no snapshot file exists yet. The snapshot is
    /// authoritative data, not a rebuildable cache: a file that exists but
    /// cannot be decoded, or that carries a different format version, is an
    /// error rather than a silent discard.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or decoded, or if the
    /// format version does not match
    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        use tokio::fs as async_fs;

        let data = match async_fs::read(&self.path).await {
            Ok(data) => data,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(Error::Io(error)),
        };

        // Decode in a blocking task (CPU-bound operation)
        let snapshot: StoreSnapshot = spawn_blocking(move || {
            bincode::serde::decode_from_slice(&data, bincode_config())
                .map_err(|error| Error::Other(format!("Failed to decode store snapshot: {error}")))
                .map(|(snapshot, _)| snapshot)
        })
        .await
        .map_err(|error| Error::Other(format!("Task join error: {error}")))??;

        if !snapshot.is_valid() {
            return Err(Error::Config(format!(
                "store snapshot version {} does not match expected {}",
                snapshot.version,
                StoreSnapshot::VERSION
            )));
        }

        Ok(Some(snapshot))
    }

    /// Write a snapshot to disk (async version).
    ///
    /// # Errors
    /// Returns an error if encoding or the file write fails
    pub async fn save(&self, snapshot: StoreSnapshot) -> Result<()> {
        let path = self.path.clone();
        info!(
            "  Saving store snapshot with {} document(s) to {}",
            snapshot.documents.len(),
            path.display()
        );

        let bytes_written = spawn_blocking(move || write_snapshot(&path, &snapshot))
            .await
            .map_err(|error| Error::Other(format!("Task join error: {error}")))??;

        info!("  ✓ Store snapshot saved ({bytes_written} bytes)");
        Ok(())
    }

    /// Write a snapshot to disk (sync version for Drop).
    ///
    /// # Errors
    /// Returns an error if encoding or the file write fails
    pub fn save_sync(&self, snapshot: &StoreSnapshot) -> Result<()> {
        info!(
            "  Saving store snapshot with {} document(s) to {}",
            snapshot.documents.len(),
            self.path.display()
        );
        let bytes_written = write_snapshot(&self.path, snapshot)?;
        info!("  ✓ Store snapshot saved ({bytes_written} bytes)");
        Ok(())
    }
}

/// Encode and atomically replace the snapshot file.
///
/// The bytes land in a temp file in the target directory first and are
/// renamed over the old snapshot, so a crash mid-write never leaves a
/// truncated file behind.
fn write_snapshot(path: &Path, snapshot: &StoreSnapshot) -> Result<usize> {
    let bytes = bincode::serde::encode_to_vec(snapshot, bincode_config())
        .map_err(|error| Error::Other(format!("Failed to encode store snapshot: {error}")))?;

    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory)?;

    let mut temp_file = NamedTempFile::new_in(directory)?;
    temp_file.write_all(&bytes)?;
    temp_file.persist(path).map_err(|error| {
        Error::Other(format!(
            "Failed to replace snapshot at {}: {error}",
            path.display()
        ))
    })?;

    Ok(bytes.len())
}
