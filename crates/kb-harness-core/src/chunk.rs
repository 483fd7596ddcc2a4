//! Recursive character text splitter.
//!
//! Splits document text into overlapping windows of at most `chunk_size`
//! characters. Splitting prefers the coarsest boundary present in the text,
//! walking down the separator ladder:
//!
//! ```text
//! "\n\n"  paragraph
//! "\n"    line
//! " "     word
//! ""      single character (hard split)
//! ```
//!
//! # Algorithm
//!
//! 1. Pick the first separator that occurs in the text and split on it.
//!    The separator stays attached to the start of the following piece.
//! 2. Pieces shorter than `chunk_size` are merged greedily into windows.
//!    When a window is full it is emitted, then pieces are dropped from its
//!    front until at most `chunk_overlap` characters remain; those carry
//!    over into the next window.
//! 3. Pieces that are still too long are split again with the next
//!    separator.
//! 4. Emitted windows are whitespace-trimmed; empty ones are discarded.
//!
//! Lengths are counted in `char`s, so multi-byte text never splits inside
//! a code point.
//!
//! # Example
//!
//! ```rust
//! use kb_harness_core::chunk::RecursiveSplitter;
//!
//! let splitter = RecursiveSplitter::new(1000, 200).unwrap();
//! let chunks = splitter.split_text(&"a".repeat(2400));
//! assert_eq!(chunks.len(), 3);
//! ```

use std::collections::VecDeque;

use anyhow::{bail, Result};

use crate::models::{Chunk, Document};

/// Default window length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows of one document.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splitter configuration. Construct with [`RecursiveSplitter::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl RecursiveSplitter {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// `chunk_size` must be > 0 and `chunk_overlap` must be smaller than it.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
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

    /// Split every document, preserving document order and the order of
    /// chunks within each document.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            for (index, text) in self.split_text(&document.text).into_iter().enumerate() {
                chunks.push(Chunk::new(document, index as i64, text));
            }
        }
        chunks
    }

    /// Split raw text into trimmed, non-empty windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let finer = separators.get(position + 1..).unwrap_or(&[]);

        let mut out = Vec::new();
        let mut short: Vec<&str> = Vec::new();

        for piece in split_keep_start(text, separator) {
            if char_len(piece) < self.chunk_size {
                short.push(piece);
                continue;
            }
            if !short.is_empty() {
                out.extend(self.merge(&short));
                short.clear();
            }
            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed.to_string());
                }
            } else {
                out.extend(self.split_recursive(piece, finer));
            }
        }

        if !short.is_empty() {
            out.extend(self.merge(&short));
        }
        out
    }

    /// Greedily pack short pieces into windows, carrying overlap forward.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(window) = join_trimmed(&current) {
                    windows.push(window);
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match current.pop_front() {
                        Some(dropped) => total -= char_len(dropped),
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += len;
        }

        if let Some(window) = join_trimmed(&current) {
            windows.push(window);
        }
        windows
    }
}

/// Split `text` on `separator`, keeping each separator at the start of the
/// piece that follows it. An empty separator splits into single chars.
fn split_keep_start<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::META_PAGE;

    #[test]
    fn test_unbroken_text_overlaps_by_200() {
        let text: String = (0..2400)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunks = RecursiveSplitter::default().split_text(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], text[..1000]);
        assert_eq!(chunks[1], text[800..1800]);
        assert_eq!(chunks[2], text[1600..]);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = RecursiveSplitter::default().split_text("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_empty_and_blank_text_yield_nothing() {
        let splitter = RecursiveSplitter::default();
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \n").is_empty());
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let first = "a".repeat(600);
        let second = "b".repeat(600);
        let text = format!("{}\n\n{}", first, second);
        let chunks = RecursiveSplitter::default().split_text(&text);
        assert_eq!(chunks, vec![first, second]);
    }

    #[test]
    fn test_word_windows_overlap() {
        let text = (0..400)
            .map(|i| format!("word{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = RecursiveSplitter::new(200, 50).unwrap().split_text(&text);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(pair[0].chars().count() <= 200);
            let head: String = pair[1].chars().take(7).collect();
            assert!(pair[0].contains(&head), "no overlap between {:?} and {:?}", pair[0], pair[1]);
            assert!(!pair[0].starts_with(' ') && !pair[0].ends_with(' '));
        }
    }

    #[test]
    fn test_multibyte_text_is_split_on_char_boundaries() {
        let text = "é".repeat(250);
        let chunks = RecursiveSplitter::new(100, 10).unwrap().split_text(&text);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
            assert!(c.chars().all(|ch| ch == 'é'));
        }
    }

    #[test]
    fn test_split_documents_preserves_order() {
        let docs = vec![
            Document::new("a.txt", "x".repeat(1500)),
            Document::new("b.pdf", "only page").with_meta(META_PAGE, "1"),
        ];
        let chunks = RecursiveSplitter::default().split_documents(&docs);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].source_path, "a.txt");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].source_path, "a.txt");
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[2].source_path, "b.pdf");
        assert_eq!(chunks[2].chunk_index, 0);
        assert_eq!(chunks[2].metadata.get(META_PAGE).map(String::as_str), Some("1"));
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta.\n\nGamma delta epsilon.\nZeta eta theta iota.";
        let splitter = RecursiveSplitter::new(20, 5).unwrap();
        assert_eq!(splitter.split_text(text), splitter.split_text(text));
    }

    #[test]
    fn test_rejects_invalid_sizes() {
        assert!(RecursiveSplitter::new(0, 0).is_err());
        assert!(RecursiveSplitter::new(100, 100).is_err());
        assert!(RecursiveSplitter::new(100, 99).is_ok());
    }
}
