//! Document and embedding storage for the almagest search engine.
//!
//! This crate keeps documents and their embedding vectors in one keyed store
//! with an in-memory nearest-neighbor index, and persists the whole state as
//! a versioned binary snapshot.

/// In-memory nearest-neighbor index over embedding vectors.
pub mod index;
/// Snapshot encoding and file replacement.
pub mod persistence;
/// Keyed document and embedding storage.
pub mod store;

pub use index::{MAX_SEARCH_LIMIT, MIN_SEARCH_LIMIT, SearchHit, VectorIndex};
pub use persistence::{SnapshotFile, StoreSnapshot};
pub use store::{DocumentStore, EmbeddingRecord};
