//! In-memory [`VectorStore`] for tests and throwaway sessions.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over everything stored.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{ChunkRecord, RetrievedChunk};

use super::{check_embedding, rank_nearest, VectorStore};

pub struct InMemoryStore {
    records: RwLock<Vec<ChunkRecord>>,
    /// Model and dims recorded by the first `ensure_ready`.
    embedding: RwLock<Option<(String, usize)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            embedding: RwLock::new(None),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> Error {
    Error::StoreUnavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_ready(&self, model: &str, dims: usize) -> Result<()> {
        let mut embedding = self.embedding.write().map_err(|_| poisoned())?;
        match embedding.as_ref() {
            Some((stored_model, stored_dims)) => check_embedding(
                "in-memory",
                (stored_model.as_str(), *stored_dims),
                (model, dims),
            ),
            None => {
                *embedding = Some((model.to_string(), dims));
                Ok(())
            }
        }
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(|_| poisoned())?.len())
    }

    async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        let mut stored = self.records.write().map_err(|_| poisoned())?;
        if let Some(dup) = records
            .iter()
            .find(|r| stored.iter().any(|s| s.id == r.id))
        {
            return Err(Error::StoreUnavailable(format!(
                "duplicate chunk id: {}",
                dup.id
            )));
        }
        stored.extend_from_slice(records);
        Ok(())
    }

    async fn nearest(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let stored = self.records.read().map_err(|_| poisoned())?;
        rank_nearest(
            query,
            stored
                .iter()
                .map(|r| (r.vector.as_slice(), r.text.as_str(), &r.metadata)),
            top_k,
        )
    }
}
