//! Persistent [`VectorIndex`] backed by SQLite.
//!
//! Lives at `<index.path>/index.sqlite` in WAL mode so retrieval can read
//! while an ingestion run appends. Embeddings are stored as little-endian
//! f32 BLOBs and scored with brute-force cosine similarity.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use kb_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use kb_harness_core::index::VectorIndex;
use kb_harness_core::models::{IndexEntry, SearchHit};

pub const INDEX_FILE: &str = "index.sqlite";

pub struct SqliteIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteIndex {
    /// Open (creating if needed) the index stored under `dir`.
    pub async fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;
        let path = dir.join(INDEX_FILE);

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open index: {}", path.display()))?;

        let index = Self { pool, path };
        index.migrate().await?;
        Ok(index)
    }

    /// Open an existing index without creating anything on disk.
    pub async fn open_existing(dir: &Path) -> Result<Self> {
        let path = dir.join(INDEX_FILE);
        if !path.is_file() {
            anyhow::bail!("no index at {}", path.display());
        }
        Self::open(dir).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source_path)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO entries (id, source_path, chunk_index, text, metadata_json, hash,
                                     embedding, model, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.chunk.source_path)
            .bind(entry.chunk.chunk_index)
            .bind(&entry.chunk.text)
            .bind(&metadata_json)
            .bind(&entry.chunk.hash)
            .bind(vec_to_blob(&entry.embedding))
            .bind(&entry.model)
            .bind(entry.embedding.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn nearest(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query("SELECT id, source_path, text, embedding FROM entries")
            .fetch_all(&self.pool)
            .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            hits.push(SearchHit {
                entry_id: row.try_get("id")?,
                source_path: row.try_get("source_path")?,
                text: row.try_get("text")?,
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn contents(&self) -> Result<Vec<String>> {
        let texts: Vec<String> = sqlx::query_scalar("SELECT text FROM entries ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(texts)
    }

    async fn sources(&self) -> Result<Vec<String>> {
        let sources: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT source_path FROM entries ORDER BY source_path")
                .fetch_all(&self.pool)
                .await?;
        Ok(sources)
    }

    async fn remove_source(&self, source_path: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM entries WHERE source_path = ?")
            .bind(source_path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_harness_core::models::{Chunk, Document};

    fn entry(id: &str, source: &str, text: &str, embedding: Vec<f32>) -> IndexEntry {
        let doc = Document::new(source, text);
        IndexEntry {
            id: id.to_string(),
            chunk: Chunk::new(&doc, 0, text.to_string()),
            embedding,
            model: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_open_creates_file_and_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("vectorstore");
        let index = SqliteIndex::open(&dir).await.unwrap();
        assert!(index.path().is_file());
        assert_eq!(index.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_open_existing_requires_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(SqliteIndex::open_existing(tmp.path()).await.is_err());
        assert!(!tmp.path().join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_nearest_orders_by_similarity() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        index
            .upsert(&[
                entry("1", "a.md", "east", vec![1.0, 0.0]),
                entry("2", "a.md", "north", vec![0.0, 1.0]),
                entry("3", "b.md", "north-east", vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.nearest(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "east");
        assert_eq!(hits[1].text, "north-east");
    }

    #[tokio::test]
    async fn test_persists_across_reopen_and_keeps_order() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let index = SqliteIndex::open(tmp.path()).await.unwrap();
            index
                .upsert(&[
                    entry("a", "x.md", "first", vec![1.0]),
                    entry("b", "x.md", "second", vec![1.0]),
                ])
                .await
                .unwrap();
        }
        let index = SqliteIndex::open_existing(tmp.path()).await.unwrap();
        assert_eq!(index.contents().await.unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_remove_source() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SqliteIndex::open(tmp.path()).await.unwrap();
        index
            .upsert(&[
                entry("1", "gone.md", "g1", vec![1.0]),
                entry("2", "gone.md", "g2", vec![1.0]),
                entry("3", "kept.md", "k", vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(index.sources().await.unwrap(), vec!["gone.md", "kept.md"]);
        assert_eq!(index.remove_source("gone.md").await.unwrap(), 2);
        assert_eq!(index.contents().await.unwrap(), vec!["k"]);
    }
}
