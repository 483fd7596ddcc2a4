//! In-memory [`VectorIndex`] for tests and embedding into other tools.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`; search is
//! brute-force cosine similarity.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{IndexEntry, SearchHit};

use super::VectorIndex;

#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<IndexEntry>>> {
        self.entries
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<IndexEntry>>> {
        self.entries
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        self.write()?.extend_from_slice(entries);
        Ok(())
    }

    async fn nearest(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let entries = self.read()?;
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .map(|e| SearchHit {
                entry_id: e.id.clone(),
                source_path: e.chunk.source_path.clone(),
                text: e.chunk.text.clone(),
                score: cosine_similarity(query_vec, &e.embedding) as f64,
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    async fn contents(&self) -> Result<Vec<String>> {
        Ok(self.read()?.iter().map(|e| e.chunk.text.clone()).collect())
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let mut sources: Vec<String> = self
            .read()?
            .iter()
            .map(|e| e.chunk.source_path.clone())
            .collect();
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    async fn remove_source(&self, source_path: &str) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|e| e.chunk.source_path != source_path);
        Ok(before - entries.len())
    }
}
