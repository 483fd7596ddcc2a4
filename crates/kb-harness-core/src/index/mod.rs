//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the only view ingestion and retrieval have
//! of the index: entries go in, nearest neighbours come out. The layout of
//! the underlying storage belongs to the implementation.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`upsert`](VectorIndex::upsert) | Append embedded chunks (no dedup) |
//! | [`nearest`](VectorIndex::nearest) | Top-k entries by cosine similarity |
//! | [`len`](VectorIndex::len) | Number of stored entries |
//! | [`contents`](VectorIndex::contents) | Raw chunk texts, no embedder needed |
//! | [`sources`](VectorIndex::sources) | Distinct source paths |
//! | [`remove_source`](VectorIndex::remove_source) | Drop every entry of one file |

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{IndexEntry, SearchHit};

/// A persistent or in-memory store of embedded chunks.
///
/// Implementations must tolerate concurrent readers alongside a single
/// writer; they add no locking of their own beyond that.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append entries. Calling this twice with the same chunks stores them
    /// twice; change detection upstream is what avoids re-embedding.
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Return up to `k` entries ordered by descending similarity to
    /// `query_vec`.
    async fn nearest(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    /// Every stored chunk text, in insertion order.
    async fn contents(&self) -> Result<Vec<String>>;

    /// Distinct source paths with at least one entry, sorted.
    async fn sources(&self) -> Result<Vec<String>>;

    /// Remove all entries whose chunk came from `source_path`. Returns the
    /// number removed.
    async fn remove_source(&self, source_path: &str) -> Result<usize>;
}
