//! SQLite-backed [`VectorStore`].
//!
//! The store lives in a directory; the index file inside it is created on
//! first use. Chunks are rows in the `chunks` table tagged with their
//! collection; vectors are little-endian `f32` BLOBs and similarity is
//! computed in Rust.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::{ChunkMetadata, ChunkRecord, RetrievedChunk};

use super::{check_embedding, rank_nearest, VectorStore, COSINE};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    /// Connect to the index in `store_dir`, creating the directory if needed.
    pub async fn open(store_dir: &Path, collection: &str) -> Result<Self> {
        let pool = db::connect(store_dir).await?;
        Ok(Self::new(pool, collection))
    }

    pub fn new(pool: SqlitePool, collection: &str) -> Self {
        Self {
            pool,
            collection: collection.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_ready(&self, model: &str, dims: usize) -> Result<()> {
        migrate::run_migrations(&self.pool).await?;

        let created = sqlx::query(
            r#"
            INSERT OR IGNORE INTO collections (name, metric, model, dims, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.collection)
        .bind(COSINE)
        .bind(model)
        .bind(dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected()
            > 0;

        if created {
            info!(collection = %self.collection, metric = COSINE, model, dims, "created collection");
        }

        let row = sqlx::query("SELECT metric, model, dims FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        let metric: String = row.get("metric");
        let stored_model: String = row.get("model");
        let stored_dims: i64 = row.get("dims");

        if metric != COSINE {
            return Err(Error::StoreUnavailable(format!(
                "collection '{}' uses metric '{}', expected '{}'",
                self.collection, metric, COSINE
            )));
        }

        check_embedding(
            &self.collection,
            (stored_model.as_str(), stored_dims as usize),
            (model, dims),
        )
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, source, chunk_index, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.id)
            .bind(&self.collection)
            .bind(&record.metadata.source)
            .bind(record.metadata.chunk_index)
            .bind(&record.text)
            .bind(&record.hash)
            .bind(vec_to_blob(&record.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(collection = %self.collection, rows = records.len(), "bulk add committed");
        Ok(())
    }

    async fn nearest(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT source, chunk_index, text, embedding
            FROM chunks
            WHERE collection = ?
            ORDER BY rowid
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let stored: Vec<(Vec<f32>, String, ChunkMetadata)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                (
                    blob_to_vec(&blob),
                    row.get("text"),
                    ChunkMetadata {
                        source: row.get("source"),
                        chunk_index: row.get("chunk_index"),
                    },
                )
            })
            .collect();

        rank_nearest(
            query,
            stored
                .iter()
                .map(|(v, text, meta)| (v.as_slice(), text.as_str(), meta)),
            top_k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, idx: i64, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            text: format!("chunk {}", idx),
            hash: format!("hash-{}", idx),
            vector,
            metadata: ChunkMetadata {
                source: "notes.md".to_string(),
                chunk_index: idx,
            },
        }
    }

    #[tokio::test]
    async fn test_open_creates_missing_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested").join("index");

        let store = SqliteStore::open(&dir, "joe_docs").await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();

        assert!(db::index_path(&dir).exists());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();

        let metric: String = sqlx::query_scalar("SELECT metric FROM collections WHERE name = ?")
            .bind("joe_docs")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(metric, "cosine");
    }

    #[tokio::test]
    async fn test_add_and_nearest_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();

        store
            .add(&[
                record("a", 0, vec![1.0, 0.0, 0.0]),
                record("b", 1, vec![0.0, 1.0, 0.0]),
                record("c", 2, vec![0.7, 0.7, 0.0]),
            ])
            .await
            .unwrap();

        let hits = store.nearest(&[1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.chunk_index, 0);
        assert_eq!(hits[1].metadata.chunk_index, 2);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_failed_bulk_add_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();

        // Same (source, chunk_index) twice violates the unique constraint.
        let result = store
            .add(&[record("a", 0, vec![1.0]), record("b", 0, vec![1.0])])
            .await;

        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let tmp = TempDir::new().unwrap();
        let first = SqliteStore::open(tmp.path(), "first").await.unwrap();
        first.ensure_ready("hashing", 3).await.unwrap();
        first.add(&[record("a", 0, vec![1.0])]).await.unwrap();

        let second = SqliteStore::open(tmp.path(), "second").await.unwrap();
        second.ensure_ready("hashing", 3).await.unwrap();
        assert_eq!(second.count().await.unwrap(), 0);
        assert_eq!(first.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_cosine_collection_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        migrate::run_migrations(&store.pool).await.unwrap();
        sqlx::query("INSERT INTO collections (name, metric, model, dims, created_at) VALUES ('joe_docs', 'l2', 'hashing', 3, 0)")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store.ensure_ready("hashing", 3).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_reopen_with_other_embedding_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();
        store.add(&[record("a", 0, vec![1.0, 0.0, 0.0])]).await.unwrap();
        store.close().await;

        let reopened = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        let err = reopened.ensure_ready("hashing", 512).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(ref m) if m.contains("512")));

        let err = reopened
            .ensure_ready("text-embedding-3-small", 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));

        reopened.ensure_ready("hashing", 3).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_nearest_rejects_query_of_other_length() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(tmp.path(), "joe_docs").await.unwrap();
        store.ensure_ready("hashing", 3).await.unwrap();
        store.add(&[record("a", 0, vec![1.0, 0.0, 0.0])]).await.unwrap();

        let err = store.nearest(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}
