//! Vector storage for document chunks.
//!
//! The [`VectorStore`] trait is the persistence seam: a SQLite backend for
//! real runs ([`sqlite::SqliteStore`]) and an in-memory one for tests
//! ([`memory::InMemoryStore`]). [`DocumentStore`] layers chunking and
//! embedding on top and is what the rest of the crate talks to.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_ready`](VectorStore::ensure_ready) | Open/create the index and collection (cosine metric, embedding model and dims) |
//! | [`count`](VectorStore::count) | Number of stored chunks |
//! | [`add`](VectorStore::add) | Atomic bulk write of chunk records |
//! | [`nearest`](VectorStore::nearest) | Top-k by ascending cosine distance |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ChunkingConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::ingest::{ingest_files, IngestReport};
use crate::models::{ChunkMetadata, ChunkRecord, RetrievedChunk, SourceFile};
use crate::search::{retrieve, Retriever};

/// Similarity metric recorded for every collection.
pub const COSINE: &str = "cosine";

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open or create the backing index and record the embedding `model`
    /// and `dims` that fill it. Idempotent for the same embedding; a
    /// collection built with another model or dimensionality fails with
    /// [`Error::StoreUnavailable`].
    async fn ensure_ready(&self, model: &str, dims: usize) -> Result<()>;

    /// Number of chunks currently stored.
    async fn count(&self) -> Result<usize>;

    /// Write all records or none.
    async fn add(&self, records: &[ChunkRecord]) -> Result<()>;

    /// The `top_k` records closest to `query`, nearest first.
    async fn nearest(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Compare the embedding a collection was built with against the one in use.
pub(crate) fn check_embedding(
    collection: &str,
    stored: (&str, usize),
    wanted: (&str, usize),
) -> Result<()> {
    if stored != wanted {
        return Err(Error::StoreUnavailable(format!(
            "collection '{}' holds {}-dim '{}' embeddings, configured embedder is {}-dim '{}'; \
             remove the store directory to rebuild it",
            collection, stored.1, stored.0, wanted.1, wanted.0
        )));
    }
    Ok(())
}

/// Rank stored vectors against `query` and keep the `top_k` nearest.
///
/// The sort is stable, so equal distances keep storage order. A stored
/// vector whose length differs from the query fails the whole search.
pub(crate) fn rank_nearest<'a, I>(
    query: &[f32],
    rows: I,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>>
where
    I: IntoIterator<Item = (&'a [f32], &'a str, &'a ChunkMetadata)>,
{
    let mut hits = Vec::new();
    for (vector, text, metadata) in rows {
        if vector.len() != query.len() {
            return Err(Error::StoreUnavailable(format!(
                "stored vector for {} has {} dims, query has {}",
                metadata,
                vector.len(),
                query.len()
            )));
        }
        hits.push(RetrievedChunk {
            text: text.to_string(),
            metadata: metadata.clone(),
            distance: 1.0 - cosine_similarity(query, vector),
        });
    }

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
    Ok(hits)
}

/// Chunk store with embedding attached: idempotent ingest and text query.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn VectorStore>,
    embedder: Embedder,
    chunking: ChunkingConfig,
}

impl DocumentStore {
    pub fn new(backend: Arc<dyn VectorStore>, embedder: Embedder, chunking: ChunkingConfig) -> Self {
        Self {
            backend,
            embedder,
            chunking,
        }
    }

    /// Prepare the backend for this store's embedder.
    pub async fn ensure_ready(&self) -> Result<()> {
        let provider = self.embedder.provider();
        self.backend
            .ensure_ready(provider.model_name(), provider.dims())
            .await
    }

    pub async fn count(&self) -> Result<usize> {
        self.backend.count().await
    }

    /// Chunk, embed and store `files`, unless the store already holds chunks.
    pub async fn ingest(&self, files: &[SourceFile]) -> Result<IngestReport> {
        ingest_files(self.backend.as_ref(), &self.embedder, &self.chunking, files).await
    }

    /// Embed `text` and return its `top_k` nearest chunks.
    pub async fn query(&self, text: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        retrieve(self.backend.as_ref(), &self.embedder, text, top_k).await
    }
}

#[async_trait]
impl Retriever for DocumentStore {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        self.query(query, top_k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source: &str, idx: i64) -> ChunkMetadata {
        ChunkMetadata {
            source: source.to_string(),
            chunk_index: idx,
        }
    }

    #[test]
    fn test_rank_nearest_orders_by_distance_and_truncates() {
        let vectors = [vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        let metas = [meta("a", 0), meta("b", 0), meta("c", 0)];
        let texts = ["far", "exact", "near"];
        let rows = (0..3).map(|i| (vectors[i].as_slice(), texts[i], &metas[i]));

        let hits = rank_nearest(&[1.0, 0.0], rows, 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "exact");
        assert!(hits[0].distance.abs() < 1e-6);
        assert_eq!(hits[1].text, "near");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_rank_nearest_with_fewer_rows_than_k() {
        let v = vec![1.0, 0.0];
        let m = meta("a", 0);
        let hits =
            rank_nearest(&[1.0, 0.0], std::iter::once((v.as_slice(), "only", &m)), 6).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_rank_nearest_rejects_dimension_mismatch() {
        let v = vec![1.0, 0.0, 0.0];
        let m = meta("a.md", 0);
        let err = rank_nearest(&[1.0, 0.0], std::iter::once((v.as_slice(), "t", &m)), 6)
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(ref msg) if msg.contains("[a.md#0]")));
    }

    #[test]
    fn test_check_embedding() {
        assert!(check_embedding("c", ("hashing", 256), ("hashing", 256)).is_ok());
        assert!(matches!(
            check_embedding("c", ("hashing", 256), ("hashing", 512)),
            Err(Error::StoreUnavailable(_))
        ));
        assert!(check_embedding("c", ("text-embedding-3-small", 256), ("hashing", 256)).is_err());
    }
}
