//! Fixed-window text chunker.
//!
//! Splits document text into [`Chunk`]s of `chunk_size` characters where each
//! window shares `chunk_overlap` characters with the one before it. Sizes are
//! counted in Unicode scalar values, so a window never cuts through a
//! multi-byte UTF-8 sequence.
//!
//! # Algorithm
//!
//! 1. Collect the byte offset of every character boundary.
//! 2. Emit `text[start .. start + chunk_size]` (clamped to the end of text).
//! 3. Advance `start` by the stride `chunk_size - chunk_overlap`.
//! 4. Stop once a window reaches the end of the text; the tail window may be
//!    shorter than `chunk_size` and is kept as-is.
//!
//! An empty document produces no chunks. A configuration where the overlap is
//! not smaller than the window is rejected by [`SplitterConfig::new`], so the
//! stride is always at least one character.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::{split_text, SplitterConfig};
//!
//! let config = SplitterConfig::new(10, 2).unwrap();
//! let chunks = split_text("notes.txt", "abcdefghijklmnop", &config);
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "abcdefghij");
//! assert_eq!(chunks[1].text, "ijklmnop");
//! ```

use std::iter;

use crate::error::ConfigError;
use crate::models::{Chunk, SourceText};

pub const DEFAULT_CHUNK_SIZE: usize = 5000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 500;

/// Validated window parameters for [`split_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SplitterConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError("chunk size must be > 0".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Split one document into overlapping windows.
///
/// Returned chunks carry contiguous positions `0, 1, …, N-1`.
pub fn split_text(source_id: &str, text: &str, config: &SplitterConfig) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let mut chunks = Vec::with_capacity(char_count / config.stride() + 1);
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(char_count);
        chunks.push(Chunk {
            source_id: source_id.to_string(),
            position: chunks.len(),
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        if end == char_count {
            break;
        }
        start += config.stride();
    }

    chunks
}

/// Split every document in order, concatenating the results.
pub fn split_documents(documents: &[SourceText], config: &SplitterConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| split_text(&doc.source_id, &doc.text, config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize) -> SplitterConfig {
        SplitterConfig::new(size, overlap).unwrap()
    }

    /// Rebuild the original text from overlapping windows.
    fn stitch(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&c.text);
            } else {
                out.extend(c.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("doc1", "The sky is blue. Grass is green.", &config(100, 0));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].text, "The sky is blue. Grass is green.");
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(split_text("doc1", "", &SplitterConfig::default()).is_empty());
    }

    #[test]
    fn test_overlap_not_smaller_than_size_rejected() {
        assert!(SplitterConfig::new(100, 100).is_err());
        assert!(SplitterConfig::new(100, 150).is_err());
        assert!(SplitterConfig::new(0, 0).is_err());
        assert!(SplitterConfig::new(100, 99).is_ok());
    }

    #[test]
    fn test_defaults() {
        let c = SplitterConfig::default();
        assert_eq!(c.chunk_size(), 5000);
        assert_eq!(c.chunk_overlap(), 500);
    }

    #[test]
    fn test_full_coverage_with_exact_overlap() {
        let text: String = (0..997).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        for (size, overlap) in [(10, 0), (10, 3), (64, 63), (100, 50), (1000, 10), (7, 1)] {
            let chunks = split_text("doc", &text, &config(size, overlap));
            assert_eq!(stitch(&chunks, overlap), text, "size={size} overlap={overlap}");

            for pair in chunks.windows(2) {
                let prev: Vec<char> = pair[0].text.chars().collect();
                let next: Vec<char> = pair[1].text.chars().collect();
                assert_eq!(prev.len(), size, "only the last chunk may be short");
                assert_eq!(&prev[size - overlap..], &next[..overlap]);
            }
            for (i, c) in chunks.iter().enumerate() {
                assert_eq!(c.position, i);
            }
        }
    }

    #[test]
    fn test_text_exactly_one_window() {
        let chunks = split_text("doc", "abcdefghij", &config(10, 5));
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────┐\n│ héllo │\n└──────┘";
        let chunks = split_text("doc", text, &config(4, 1));
        assert_eq!(stitch(&chunks, 1), text);
        for c in &chunks {
            assert!(c.text.chars().count() <= 4);
        }
    }

    #[test]
    fn test_split_documents_preserves_order() {
        let docs = vec![
            SourceText::new("a.pdf", "0123456789"),
            SourceText::new("empty.pdf", ""),
            SourceText::new("b.pdf", "abcdef"),
        ];
        let chunks = split_documents(&docs, &config(6, 2));
        let labels: Vec<String> = chunks.iter().map(Chunk::label).collect();
        assert_eq!(labels, vec!["a.pdf#0", "a.pdf#1", "b.pdf#0"]);
        assert_eq!(chunks[1].text, "456789");
    }
}
