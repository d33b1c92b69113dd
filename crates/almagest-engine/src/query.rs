//! Free-text query answering.

use std::collections::HashMap;

use almagest_core::{Document, EmbeddingRef, Result};
use almagest_embed::EmbeddingClient;
use tracing::debug;

use crate::SharedStore;

/// Number of results returned when the caller does not ask for a limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Answers free-text queries against the document store.
pub struct QueryService {
    /// Client used to embed the query text.
    client: EmbeddingClient,
    /// Store searched and hydrated from.
    store: SharedStore,
}

impl QueryService {
    /// Create a service over the given client and store.
    pub fn new(client: EmbeddingClient, store: SharedStore) -> Self {
        Self { client, store }
    }

    /// Answer one query with ranked, fully hydrated documents.
    ///
    /// The query text is embedded whole, the vector index is searched with
    /// the (clamped) limit, and the ranked references are resolved to their
    /// documents. Resolution carries no order contract, so the output is
    /// re-ordered to the similarity ranking before returning.
    ///
    /// # Errors
    /// Returns an error if embedding the query fails
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<Document>> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let query_vector = self.client.embed_query(query).await?;

        let store = self.store.read().await;
        let hits = store.search(&query_vector, limit);
        debug!("Query matched {} embedding(s)", hits.len());

        let refs: Vec<EmbeddingRef> = hits.iter().map(|hit| hit.embedding_ref).collect();
        let mut documents = store.resolve_by_embedding_refs(&refs);
        drop(store);

        let rank: HashMap<EmbeddingRef, usize> = refs
            .iter()
            .enumerate()
            .map(|(position, reference)| (*reference, position))
            .collect();
        documents.sort_by_key(|document| {
            document
                .embedding_ref
                .and_then(|reference| rank.get(&reference).copied())
                .unwrap_or(usize::MAX)
        });

        Ok(documents)
    }
}
