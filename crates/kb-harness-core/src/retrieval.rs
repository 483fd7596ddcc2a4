//! Best-effort context retrieval.
//!
//! [`retrieve_context`] is what a generation step calls: it never fails.
//! When the query cannot be answered (no embedder, empty or broken index)
//! the caller gets a bracketed diagnostic string in place of context, so
//! generation keeps going with whatever it has.

use std::fmt::Display;

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::embedding::{embed_query, Embedder};
use crate::index::VectorIndex;

/// Joins retrieved chunk texts into one context blob.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Return the `k` nearest chunk texts joined by [`CONTEXT_SEPARATOR`], or a
/// diagnostic placeholder if retrieval is unavailable.
pub async fn retrieve_context(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    query: &str,
    k: usize,
) -> String {
    if k == 0 {
        return String::new();
    }
    match nearest_texts(embedder, index, query, k).await {
        Ok(texts) => {
            debug!(hits = texts.len(), k, "retrieved context");
            texts.join(CONTEXT_SEPARATOR)
        }
        Err(e) => {
            warn!(error = %e, "retrieval unavailable");
            unavailable(format!("{:#}", e))
        }
    }
}

/// The placeholder returned in place of context.
pub fn unavailable(cause: impl Display) -> String {
    format!("[Vectorstore error: {}]", cause)
}

/// Whether `context` is a placeholder produced by [`unavailable`].
pub fn is_unavailable(context: &str) -> bool {
    context.starts_with("[Vectorstore error: ") && context.ends_with(']')
}

/// Fallible core of [`retrieve_context`].
pub async fn nearest_texts(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    query: &str,
    k: usize,
) -> Result<Vec<String>> {
    if index.len().await? == 0 {
        bail!("index is empty");
    }
    let query_vec = embed_query(embedder, query).await?;
    let hits = index.nearest(&query_vec, k).await?;
    Ok(hits.into_iter().map(|h| h.text).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::InMemoryIndex;
    use crate::models::{Chunk, Document, IndexEntry};
    use async_trait::async_trait;

    /// One-hot on the first letter, so "apple" is nearest to "a..." chunks.
    struct FirstLetter;

    #[async_trait]
    impl Embedder for FirstLetter {
        fn model_name(&self) -> &str {
            "first-letter"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    if let Some(c) = t.bytes().next().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] = 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    struct Broken;

    #[async_trait]
    impl Embedder for Broken {
        fn model_name(&self) -> &str {
            "broken"
        }
        fn dims(&self) -> usize {
            0
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("provider offline")
        }
    }

    async fn index_with(texts: &[&str]) -> InMemoryIndex {
        let index = InMemoryIndex::new();
        let doc = Document::new("doc.md", texts.join(" "));
        let entries: Vec<IndexEntry> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| IndexEntry {
                id: i.to_string(),
                chunk: Chunk::new(&doc, i as i64, t.to_string()),
                embedding: one_hot(t),
                model: "first-letter".to_string(),
            })
            .collect();
        index.upsert(&entries).await.unwrap();
        index
    }

    fn one_hot(t: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        v[(t.as_bytes()[0] - b'a') as usize] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_k3_of_five_chunks() {
        let index = index_with(&["alpha", "bravo", "charlie", "delta", "echo"]).await;
        let context = retrieve_context(&FirstLetter, &index, "apple", 3).await;
        let parts: Vec<&str> = context.split(CONTEXT_SEPARATOR).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "alpha");
    }

    #[tokio::test]
    async fn test_empty_index_is_placeholder() {
        let index = InMemoryIndex::new();
        let context = retrieve_context(&FirstLetter, &index, "apple", 3).await;
        assert!(is_unavailable(&context), "got {:?}", context);
        assert!(context.contains("index is empty"));
    }

    #[tokio::test]
    async fn test_embedder_failure_is_placeholder() {
        let index = index_with(&["alpha"]).await;
        let context = retrieve_context(&Broken, &index, "apple", 1).await;
        assert_eq!(context, "[Vectorstore error: provider offline]");
    }

    #[tokio::test]
    async fn test_zero_k_is_empty() {
        let index = index_with(&["alpha"]).await;
        assert_eq!(retrieve_context(&FirstLetter, &index, "apple", 0).await, "");
    }
}
