//! Nearest-neighbour retrieval over the document store.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::ingest::open_store;
use crate::models::RetrievedChunk;
use crate::store::VectorStore;

/// Anything that can return the chunks most relevant to a query.
///
/// The orchestrator depends on this trait only, so tests can hand it a
/// canned retriever instead of a real index.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Embed `query` and return the `top_k` nearest stored chunks.
///
/// No re-ranking happens here; order is whatever the store's similarity
/// search yields.
pub async fn retrieve(
    store: &dyn VectorStore,
    embedder: &Embedder,
    query: &str,
    top_k: usize,
) -> Result<Vec<RetrievedChunk>> {
    let query_vec = embedder.embed_query(query).await?;
    let hits = store.nearest(&query_vec, top_k).await?;
    debug!(top_k, hits = hits.len(), "retrieved context");
    Ok(hits)
}

/// Render retrieved chunks as citation-tagged blocks separated by blank lines.
pub fn format_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| format!("{} {}", hit.metadata, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// `joe search`
///
/// Read-only: an empty store is reported, never ingested.
pub async fn run_search(config: &Config, query: &str, limit: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = open_store(config).await?;
    if store.count().await? == 0 {
        warn!("store is empty, run `joe ingest` first");
        println!("No results.");
        return Ok(());
    }
    let top_k = limit.unwrap_or(config.retrieval.top_k);
    let hits = store.query(query, top_k).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. {} distance={:.4}", i + 1, hit.metadata, hit.distance);
        println!("    {}", snippet(&hit.text, 160));
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
