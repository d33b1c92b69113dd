//! Tests for store persistence across process restarts

#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use almagest_core::{DocumentFields, Error};
use almagest_store::DocumentStore;
use std::path::PathBuf;
use tempfile::TempDir;

fn snapshot_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("store.bin")
}

async fn populated_store(path: PathBuf) -> DocumentStore {
    let mut store = DocumentStore::open_with_dimension(path, 2)
        .await
        .expect("Failed to open store");

    store
        .upsert(
            "042",
            DocumentFields::new("Bone Loss Study")
                .with_authors(vec!["A. Lee".to_owned()])
                .with_number("042")
                .with_path("042_bone_loss.md"),
            vec![1.0, 0.0],
        )
        .expect("Failed to upsert 042");
    store
        .upsert(
            "007",
            DocumentFields::new("Radiation Shielding").with_year(2019),
            vec![0.0, 1.0],
        )
        .expect("Failed to upsert 007");

    store
}

#[tokio::test]
async fn reopened_store_matches_saved_state() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = snapshot_path(&temp_dir);

    let store = populated_store(path.clone()).await;
    let saved_summaries = store.list_summaries();
    store.save().await.expect("Failed to save store");
    drop(store);

    let reopened = DocumentStore::open_with_dimension(path, 2)
        .await
        .expect("Failed to reopen store");

    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.embedding_count(), 2);
    assert_eq!(
        reopened.list_summaries(),
        saved_summaries,
        "Listing order must survive the snapshot"
    );

    let document = reopened.get("042").expect("042 should survive the reload");
    assert_eq!(document.title, "Bone Loss Study");
    assert_eq!(document.authors, vec!["A. Lee".to_owned()]);
    assert_eq!(document.number, Some("042".to_owned()));

    // The rebuilt index must answer searches identically
    let hits = reopened.search(&[1.0, 0.0], 1);
    assert_eq!(hits.len(), 1);
    assert!((hits[0].score - 1.0).abs() < 1e-12);
    let resolved = reopened.resolve_by_embedding_refs(&[hits[0].embedding_ref]);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].external_id, "042");
}

#[tokio::test]
async fn dropping_a_dirty_store_saves_it() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = snapshot_path(&temp_dir);

    let store = populated_store(path.clone()).await;
    assert!(store.is_dirty());
    drop(store);

    let reopened = DocumentStore::open_with_dimension(path, 2)
        .await
        .expect("Failed to reopen store");
    assert_eq!(reopened.len(), 2, "Drop must flush unsaved state");
}

#[tokio::test]
async fn embedding_references_survive_reload_and_reingestion() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = snapshot_path(&temp_dir);

    let store = populated_store(path.clone()).await;
    let original_ref = store
        .get("042")
        .and_then(|document| document.embedding_ref)
        .expect("042 should carry a reference");
    store.save().await.expect("Failed to save store");
    drop(store);

    let mut reopened = DocumentStore::open_with_dimension(path, 2)
        .await
        .expect("Failed to reopen store");
    reopened
        .upsert("042", DocumentFields::new("Bone Loss Study"), vec![0.5, 0.5])
        .expect("Failed to re-upsert 042");

    let current_ref = reopened
        .get("042")
        .and_then(|document| document.embedding_ref)
        .expect("042 should carry a reference");
    assert_eq!(
        current_ref, original_ref,
        "Re-ingestion after a reload must keep the stored reference"
    );
    assert_eq!(reopened.embedding_count(), 2);
}

#[tokio::test]
async fn reopening_with_a_different_dimension_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = snapshot_path(&temp_dir);

    let store = populated_store(path.clone()).await;
    store.save().await.expect("Failed to save store");
    drop(store);

    let result = DocumentStore::open_with_dimension(path, 3).await;
    assert!(
        matches!(result, Err(Error::Config(_))),
        "A snapshot built for another dimension must be rejected"
    );
}
