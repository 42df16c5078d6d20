//! One-shot ingestion: documents → chunks → embeddings → store.
//!
//! Ingestion is guarded by the store's chunk count. A store that already
//! holds chunks is left untouched, so running it on every start never
//! duplicates data. Work only begins once the guard passes, and the write is
//! a single bulk `add`: an embedding failure leaves the store empty.

use std::sync::Arc;
use tracing::info;

use crate::chunk::chunk_document;
use crate::config::{ChunkingConfig, Config};
use crate::connector_fs;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::models::{ChunkRecord, SourceFile};
use crate::store::sqlite::SqliteStore;
use crate::store::{DocumentStore, VectorStore};

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// True when the store was already populated and nothing was done.
    pub skipped: bool,
    pub files: usize,
    pub chunks: usize,
    /// Chunk count after the run.
    pub stored: usize,
}

pub async fn ingest_files(
    store: &dyn VectorStore,
    embedder: &Embedder,
    chunking: &ChunkingConfig,
    files: &[SourceFile],
) -> Result<IngestReport> {
    let existing = store.count().await?;
    if existing > 0 {
        info!(chunks = existing, "store already populated, skipping ingestion");
        return Ok(IngestReport {
            skipped: true,
            stored: existing,
            ..IngestReport::default()
        });
    }

    let mut chunks = Vec::new();
    for file in files {
        let text = std::fs::read_to_string(&file.path).map_err(|source| Error::Io {
            path: file.path.clone(),
            source,
        })?;
        chunks.extend(chunk_document(
            &file.source,
            &text,
            chunking.chunk_size,
            chunking.overlap,
        )?);
    }

    if chunks.is_empty() {
        info!(files = files.len(), "no text to ingest");
        return Ok(IngestReport {
            files: files.len(),
            ..IngestReport::default()
        });
    }

    info!(files = files.len(), chunks = chunks.len(), "embedding chunks");
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;

    let records: Vec<ChunkRecord> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| ChunkRecord::new(chunk, vector))
        .collect();
    let chunk_count = records.len();

    store.add(&records).await?;
    let stored = store.count().await?;
    info!(chunks = chunk_count, stored, "ingestion complete");

    Ok(IngestReport {
        skipped: false,
        files: files.len(),
        chunks: chunk_count,
        stored,
    })
}

/// Open the configured store and make it ready for the configured embedder.
pub async fn open_store(config: &Config) -> Result<DocumentStore> {
    let backend = SqliteStore::open(&config.store.path, &config.store.collection).await?;
    let embedder = Embedder::from_config(&config.embedding)?;
    let store = DocumentStore::new(Arc::new(backend), embedder, config.chunking.clone());
    store.ensure_ready().await?;
    Ok(store)
}

/// Open the configured store and ingest the documents root.
pub async fn open_and_ingest(config: &Config) -> Result<(DocumentStore, IngestReport)> {
    let store = open_store(config).await?;

    // Skip the directory walk entirely when there is nothing to do.
    if store.count().await? > 0 {
        let report = store.ingest(&[]).await?;
        return Ok((store, report));
    }

    let files = connector_fs::scan_documents(&config.documents)?;
    let report = store.ingest(&files).await?;
    Ok((store, report))
}

/// `joe ingest`
pub async fn run_ingest(config: &Config) -> Result<()> {
    let (_store, report) = open_and_ingest(config).await?;

    println!("ingest");
    if report.skipped {
        println!("  already populated: {} chunks", report.stored);
    } else {
        println!("  files: {}", report.files);
        println!("  chunks written: {}", report.chunks);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingProvider, HashingProvider, Sleeper};
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Serves the first `healthy_calls` batches, then fails every call.
    struct DegradingProvider {
        healthy_calls: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for DegradingProvider {
        fn model_name(&self) -> &str {
            "degrading"
        }

        fn dims(&self) -> usize {
            32
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.healthy_calls {
                Ok(texts.iter().map(|_| vec![1.0; 32]).collect())
            } else {
                Err(Error::EmbeddingService {
                    attempts: 1,
                    message: "HTTP 503".to_string(),
                })
            }
        }
    }

    struct NoSleep;

    #[async_trait]
    impl Sleeper for NoSleep {
        async fn sleep(&self, _duration: Duration) {}
    }

    fn degrading_embedder(healthy_calls: usize) -> (Embedder, Arc<DegradingProvider>) {
        let provider = Arc::new(DegradingProvider {
            healthy_calls,
            calls: AtomicUsize::new(0),
        });
        let embedder = Embedder::new(provider.clone(), 1, 5).with_sleeper(Arc::new(NoSleep));
        (embedder, provider)
    }

    fn fixture(tmp: &TempDir) -> Vec<SourceFile> {
        let a = tmp.path().join("a.md");
        let b = tmp.path().join("b.txt");
        fs::write(&a, "Focus is the whole game. ".repeat(20)).unwrap();
        fs::write(&b, "Vector alignment matters.").unwrap();
        vec![
            SourceFile {
                path: a,
                source: "a.md".to_string(),
            },
            SourceFile {
                path: b,
                source: "b.txt".to_string(),
            },
        ]
    }

    fn embedder() -> Embedder {
        Embedder::new(Arc::new(HashingProvider::new(32)), 4, 5)
    }

    fn chunking() -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: 120,
            overlap: 20,
        }
    }

    #[tokio::test]
    async fn test_ingest_writes_all_chunks() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();

        let report = ingest_files(&store, &embedder(), &chunking(), &fixture(&tmp))
            .await
            .unwrap();

        assert!(!report.skipped);
        assert_eq!(report.files, 2);
        // a.md is 500 chars: ceil((500 - 20) / 100) = 5 windows, b.txt is one.
        assert_eq!(report.chunks, 6);
        assert_eq!(store.count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_second_ingest_is_noop() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let files = fixture(&tmp);

        ingest_files(&store, &embedder(), &chunking(), &files)
            .await
            .unwrap();
        let second = ingest_files(&store, &embedder(), &chunking(), &files)
            .await
            .unwrap();

        assert!(second.skipped);
        assert_eq!(second.stored, 6);
        assert_eq!(store.count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_bad_chunking_fails_before_writing() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let bad = ChunkingConfig {
            chunk_size: 10,
            overlap: 10,
        };

        let err = ingest_files(&store, &embedder(), &bad, &fixture(&tmp))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_files_write_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.md");
        fs::write(&path, "").unwrap();
        let store = InMemoryStore::new();

        let report = ingest_files(
            &store,
            &embedder(),
            &chunking(),
            &[SourceFile {
                path,
                source: "empty.md".to_string(),
            }],
        )
        .await
        .unwrap();

        assert_eq!(report.chunks, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        let (embedder, provider) = degrading_embedder(0);

        let err = ingest_files(&store, &embedder, &chunking(), &fixture(&tmp))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmbeddingService { attempts: 5, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failure_after_some_batches_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = InMemoryStore::new();
        // Batches of one: the first three chunks embed, the fourth never does.
        let (embedder, _provider) = degrading_embedder(3);

        let err = ingest_files(&store, &embedder, &chunking(), &fixture(&tmp))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EmbeddingService { .. }));
        assert_eq!(store.count().await.unwrap(), 0);

        // The store is still empty, so a healthy run afterwards ingests everything.
        let report = ingest_files(&store, &self::embedder(), &chunking(), &fixture(&tmp))
            .await
            .unwrap();
        assert!(!report.skipped);
        assert_eq!(store.count().await.unwrap(), 6);
    }
}
