//! Core data models that flow through ingestion and retrieval.
//!
//! ```text
//! file on disk ──▶ FileRecord ──▶ Document(s) ──▶ Chunk(s) ──▶ IndexEntry
//!                  (fingerprint)  (loader)        (splitter)   (embedder)
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Free-form string metadata carried from a document onto its chunks.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the originating file path.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the loader format (`text`, `pdf`, `docx`).
pub const META_FORMAT: &str = "format";
/// Metadata key holding the 1-based page number of a PDF document.
pub const META_PAGE: &str = "page";

/// A scanned file and the fingerprint of its current bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub fingerprint: String,
}

/// Text produced by a format loader from one file.
///
/// A single file may produce several documents (one per PDF page).
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub source_path: String,
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    /// Create a document whose metadata records its source path.
    pub fn new(source_path: impl Into<String>, text: impl Into<String>) -> Self {
        let source_path = source_path.into();
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source_path.clone());
        Self {
            source_path,
            text: text.into(),
            metadata,
        }
    }

    /// Attach one metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// A bounded window of a document's text; the unit that gets embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_path: String,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: i64,
    pub text: String,
    pub metadata: Metadata,
    /// SHA-256 of `text`, lowercase hex.
    pub hash: String,
}

impl Chunk {
    pub fn new(document: &Document, chunk_index: i64, text: String) -> Self {
        let hash = hex::encode(Sha256::digest(text.as_bytes()));
        Self {
            source_path: document.source_path.clone(),
            chunk_index,
            text,
            metadata: document.metadata.clone(),
            hash,
        }
    }
}

/// A chunk together with its embedding, as stored by a vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    /// Embedding model that produced `embedding`.
    pub model: String,
}

/// One nearest-neighbour result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry_id: String,
    pub source_path: String,
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f64,
}
