//! Sliding-window text chunker.
//!
//! Splits document text into fixed-size character windows where each window
//! starts `overlap` characters before the previous one ended. Sizes count
//! Unicode scalar values, so windows never split a multi-byte character.
//!
//! Each chunk receives a fresh UUID plus a SHA-256 hash of its text. The
//! split itself is deterministic, so `chunk_index` is stable across
//! re-ingestion of the same file.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::validate_chunking;
use crate::error::Result;
use crate::models::Chunk;

/// Split `text` into windows of `chunk_size` characters overlapping by
/// `overlap` characters.
///
/// Fails with [`Error::Configuration`](crate::error::Error::Configuration)
/// when `chunk_size <= overlap`.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    validate_chunking(chunk_size, overlap)?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let total_chars = bounds.len() - 1;

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;

    loop {
        let end = (start + chunk_size).min(total_chars);
        chunks.push(text[bounds[start]..bounds[end]].to_string());
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Split a source file's text and wrap every window in a [`Chunk`].
/// Indices are contiguous from 0.
pub fn chunk_document(
    source: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    let pieces = split_text(text, chunk_size, overlap)?;
    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(source, i as i64, piece))
        .collect())
}

fn make_chunk(source: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Rebuild the original text by dropping each chunk's overlapping prefix.
    fn reassemble(chunks: &[String], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(c);
            } else {
                out.extend(c.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 1200, 200).unwrap().is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(split_text("abc", 1200, 200).unwrap(), vec!["abc"]);
    }

    #[test]
    fn test_text_exactly_chunk_size() {
        let text = "x".repeat(1200);
        let chunks = split_text(&text, 1200, 200).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_windows_and_overlap() {
        let chunks = split_text("abcdefghij", 4, 1).unwrap();
        assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_chunk_count_and_coverage() {
        let (c, o) = (10usize, 3usize);
        for n in [11usize, 17, 24, 25, 100, 101] {
            let text: String = (0..n).map(|i| (b'a' + (i % 26) as u8) as char).collect();
            let chunks = split_text(&text, c, o).unwrap();

            let expected = (n - o + (c - o) - 1) / (c - o);
            assert_eq!(chunks.len(), expected, "n = {}", n);
            assert_eq!(reassemble(&chunks, o), text, "n = {}", n);
            assert!(text.ends_with(chunks.last().unwrap().as_str()));

            for pair in chunks.windows(2) {
                let tail: String = pair[0].chars().skip(c - o).collect();
                let head: String = pair[1].chars().take(o).collect();
                assert_eq!(tail, head);
            }
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "héllo wörld ✓ ünïcode façade".repeat(5);
        let chunks = split_text(&text, 7, 2).unwrap();
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn test_overlap_not_smaller_than_size_is_config_error() {
        assert!(matches!(
            split_text("abc", 200, 200),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            split_text("abc", 100, 200),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(split_text("", 0, 0), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_zero_overlap() {
        let chunks = split_text("abcdef", 2, 0).unwrap();
        assert_eq!(chunks, vec!["ab", "cd", "ef"]);
    }

    #[test]
    fn test_chunk_document_indices_and_metadata() {
        let text = "word ".repeat(100);
        let chunks = chunk_document("notes.md", &text, 50, 10).unwrap();
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.source, "notes.md");
            assert_eq!(c.hash.len(), 64);
        }
    }

    #[test]
    fn test_deterministic_apart_from_ids() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta";
        let c1 = chunk_document("doc.txt", text, 12, 4).unwrap();
        let c2 = chunk_document("doc.txt", text, 12, 4).unwrap();
        assert_eq!(c1.len(), c2.len());
        for (a, b) in c1.iter().zip(c2.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
            assert_eq!(a.chunk_index, b.chunk_index);
            assert_ne!(a.id, b.id);
        }
    }
}
