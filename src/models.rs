//! Core data models shared by the ingestion and query pipelines.

use std::fmt;
use std::path::PathBuf;

/// A document file discovered under the documents root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the documents root; used as the citation source.
    pub source: String,
}

/// An overlapping window of a source file's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Citation metadata stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_index: i64,
}

impl fmt::Display for ChunkMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}#{}]", self.source, self.chunk_index)
    }
}

/// A chunk paired with its embedding, ready for a bulk write.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub hash: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl ChunkRecord {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            hash: chunk.hash,
            vector,
            metadata: ChunkMetadata {
                source: chunk.source,
                chunk_index: chunk.chunk_index,
            },
        }
    }
}

/// One nearest-neighbour hit. Lower `distance` is more similar.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance: `1 - cosine similarity`.
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_citation_format() {
        let meta = ChunkMetadata {
            source: "transcripts/ep1.md".to_string(),
            chunk_index: 3,
        };
        assert_eq!(meta.to_string(), "[transcripts/ep1.md#3]");
    }
}
