//! Incremental ingestion.
//!
//! One run is a straight line:
//!
//! ```text
//! LOCK → COLLECT → DIFF ─(no changes)→ stop
//!                   └→ LOAD ─(nothing loaded)→ stop
//!                       └→ CHUNK → EMBED → INDEX → PERSIST CACHE
//! ```
//!
//! The cache is written only after the index accepted the run's entries,
//! so any early stop, error, or cancellation leaves it exactly as it was
//! and the next run retries the same files. Files that fail to load are
//! kept out of the persisted cache for the same reason.
//!
//! Deleted files drop out of the cache snapshot but their chunks stay in
//! the index until [`prune`] is run.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use kb_harness_core::chunk::RecursiveSplitter;
use kb_harness_core::embedding::Embedder;
use kb_harness_core::index::VectorIndex;
use kb_harness_core::models::{Document, IndexEntry};

use crate::cache::{cache_key, ChangeCache, ChangeSet};
use crate::collect::collect_files;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::{IngestError, LoadError};
use crate::loader::load_file;
use crate::lock::IngestLock;
use crate::sqlite_index::SqliteIndex;

/// A changed file that could not be turned into documents.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_changed: usize,
    pub files_loaded: usize,
    pub failed: Vec<FailedFile>,
    pub documents: usize,
    pub chunks: usize,
    pub cache_entries: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub enum IngestOutcome {
    /// Every collected file matched its cached fingerprint.
    NoChanges { files_seen: usize },
    /// Files changed but none of them loaded.
    NothingLoaded { failed: Vec<FailedFile> },
    /// Documents loaded but all of them were blank.
    NoChunks { documents: usize },
    Indexed(IngestReport),
}

impl IngestOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IngestOutcome::Indexed(_))
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestOutcome::NoChanges { files_seen } => {
                writeln!(f, "ingest")?;
                writeln!(f, "  files scanned: {}", files_seen)?;
                write!(f, "nothing to ingest")
            }
            IngestOutcome::NothingLoaded { failed } => {
                writeln!(f, "ingest")?;
                for file in failed {
                    writeln!(f, "  failed: {} ({})", file.path.display(), file.error)?;
                }
                write!(f, "no documents loaded")
            }
            IngestOutcome::NoChunks { documents } => {
                writeln!(f, "ingest")?;
                writeln!(f, "  documents loaded: {}", documents)?;
                write!(f, "no text to index")
            }
            IngestOutcome::Indexed(report) => write!(f, "{}", report),
        }
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ingest")?;
        writeln!(f, "  files scanned: {}", self.files_seen)?;
        writeln!(f, "  files changed: {}", self.files_changed)?;
        writeln!(f, "  files loaded: {}", self.files_loaded)?;
        for file in &self.failed {
            writeln!(f, "  failed: {} ({})", file.path.display(), file.error)?;
        }
        writeln!(f, "  documents: {}", self.documents)?;
        writeln!(f, "  chunks indexed: {}", self.chunks)?;
        writeln!(f, "  cache entries: {}", self.cache_entries)?;
        writeln!(f, "  elapsed: {:.2}s", self.elapsed.as_secs_f64())?;
        write!(f, "ok")
    }
}

pub struct Ingestor {
    config: Config,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    splitter: RecursiveSplitter,
}

impl Ingestor {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self> {
        let splitter =
            RecursiveSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        Ok(Self {
            config,
            embedder,
            index,
            splitter,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest everything under `root` that changed since the last
    /// successful run.
    pub async fn run(&self, root: &Path, cancel: &CancellationToken) -> Result<IngestOutcome> {
        let started = Instant::now();
        let ingest_cfg = &self.config.ingest;
        let _lock = IngestLock::acquire(&ingest_cfg.lock_path())?;

        let files = collect_files(root, &ingest_cfg.extensions, &ingest_cfg.exclude_globs)?;
        let cache = ChangeCache::load(&ingest_cfg.cache_path);
        let ChangeSet {
            changed,
            mut snapshot,
            unreadable,
        } = cache.diff(&files);
        info!(
            root = %root.display(),
            files = files.len(),
            changed = changed.len(),
            unreadable = unreadable.len(),
            "scanned"
        );

        if changed.is_empty() {
            info!("no changes detected, nothing to ingest");
            return Ok(IngestOutcome::NoChanges {
                files_seen: files.len(),
            });
        }

        let mut documents: Vec<Document> = Vec::new();
        let mut failed: Vec<FailedFile> = Vec::new();
        for path in &changed {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled.into());
            }
            match load_blocking(path).await {
                Ok(docs) => {
                    debug!(path = %path.display(), documents = docs.len(), "loaded");
                    documents.extend(docs);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load, will retry next run");
                    failed.push(FailedFile {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        let files_loaded = changed.len() - failed.len();

        if documents.is_empty() {
            warn!(failed = failed.len(), "no documents loaded, cache untouched");
            return Ok(IngestOutcome::NothingLoaded { failed });
        }

        let chunks = self.splitter.split_documents(&documents);
        if chunks.is_empty() {
            info!(documents = documents.len(), "documents contain no text, cache untouched");
            return Ok(IngestOutcome::NoChunks {
                documents: documents.len(),
            });
        }
        debug!(chunks = chunks.len(), "chunked");

        let batch_size = self.config.embedding.batch_size.max(1);
        let model = self.embedder.model_name().to_string();
        let mut entries: Vec<IndexEntry> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size) {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled.into());
            }
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .context("Embedding failed, cache untouched")?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }
            entries.extend(batch.iter().zip(vectors).map(|(chunk, embedding)| IndexEntry {
                id: Uuid::new_v4().to_string(),
                chunk: chunk.clone(),
                embedding,
                model: model.clone(),
            }));
            debug!(embedded = entries.len(), total = chunks.len(), "embedding");
        }
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled.into());
        }

        self.index
            .upsert(&entries)
            .await
            .context("Index write failed, cache untouched")?;

        for file in &failed {
            snapshot.remove(&cache_key(&file.path));
        }
        snapshot.save(&ingest_cfg.cache_path)?;

        let report = IngestReport {
            files_seen: files.len(),
            files_changed: changed.len(),
            files_loaded,
            failed,
            documents: documents.len(),
            chunks: entries.len(),
            cache_entries: snapshot.len(),
            elapsed: started.elapsed(),
        };
        info!(
            changed = report.files_changed,
            chunks = report.chunks,
            failed = report.failed.len(),
            "ingest complete"
        );
        Ok(IngestOutcome::Indexed(report))
    }
}

async fn load_blocking(path: &Path) -> std::result::Result<Vec<Document>, LoadError> {
    let owned = path.to_path_buf();
    run_loader(move || load_file(&owned)).await
}

/// Run a loader off the async runtime. A panic inside a parser is
/// reported as a failure of that one file.
async fn run_loader<F>(load: F) -> std::result::Result<Vec<Document>, LoadError>
where
    F: FnOnce() -> std::result::Result<Vec<Document>, LoadError> + Send + 'static,
{
    match tokio::task::spawn_blocking(load).await {
        Ok(result) => result,
        Err(e) => Err(LoadError::Panicked(e.to_string())),
    }
}

/// Open the configured index and embedder and build an [`Ingestor`].
pub async fn open_ingestor(config: &Config) -> Result<Ingestor> {
    let embedder = create_embedder(&config.embedding)?;
    let index = SqliteIndex::open(&config.index.path).await?;
    Ingestor::new(config.clone(), embedder, Arc::new(index))
}

/// Non-throwing entry point: `true` only when the run indexed new chunks.
pub async fn ingest(config: &Config, root: &Path) -> bool {
    ingest_with_cancel(config, root, &CancellationToken::new())
        .await
        .is_some_and(|outcome| outcome.is_indexed())
}

/// Like [`ingest`] but returns the outcome, or `None` if the run failed.
pub async fn ingest_with_cancel(
    config: &Config,
    root: &Path,
    cancel: &CancellationToken,
) -> Option<IngestOutcome> {
    let result = match open_ingestor(config).await {
        Ok(ingestor) => ingestor.run(root, cancel).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            error!(error = %format!("{:#}", e), "ingest failed");
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub cache_entries_removed: Vec<String>,
    pub index_sources_removed: Vec<String>,
    pub index_entries_removed: usize,
}

impl fmt::Display for PruneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "prune")?;
        writeln!(f, "  cache entries removed: {}", self.cache_entries_removed.len())?;
        writeln!(f, "  sources removed: {}", self.index_sources_removed.len())?;
        for source in &self.index_sources_removed {
            writeln!(f, "    {}", source)?;
        }
        writeln!(f, "  index entries removed: {}", self.index_entries_removed)?;
        write!(f, "ok")
    }
}

/// Remove files under `root` that no longer exist from the cache and the
/// index. Ingestion never does this on its own.
pub async fn prune_with(
    config: &Config,
    index: &dyn VectorIndex,
    root: &Path,
) -> Result<PruneReport> {
    let _lock = IngestLock::acquire(&config.ingest.lock_path())?;

    let mut cache = ChangeCache::load(&config.ingest.cache_path);
    let mut report = PruneReport {
        cache_entries_removed: cache.prune_missing(root),
        ..PruneReport::default()
    };

    for source in index.sources().await? {
        let path = Path::new(&source);
        if path.starts_with(root) && !path.exists() {
            report.index_entries_removed += index.remove_source(&source).await?;
            report.index_sources_removed.push(source);
        }
    }

    if !report.cache_entries_removed.is_empty() {
        cache.save(&config.ingest.cache_path)?;
    }

    info!(
        cache = report.cache_entries_removed.len(),
        sources = report.index_sources_removed.len(),
        entries = report.index_entries_removed,
        "prune complete"
    );
    Ok(report)
}

/// Open the configured index and prune it.
pub async fn prune(config: &Config, root: &Path) -> Result<PruneReport> {
    let index = SqliteIndex::open(&config.index.path).await?;
    prune_with(config, &index, root).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_harness_core::index::memory::InMemoryIndex;
    use std::fs;

    use crate::embedding::HashEmbedder;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.ingest.cache_path = dir.join("store/.ingest_cache.json");
        config.index.path = dir.join("store");
        config
    }

    fn ingestor(config: &Config) -> (Ingestor, Arc<InMemoryIndex>) {
        let index = Arc::new(InMemoryIndex::new());
        let ingestor = Ingestor::new(
            config.clone(),
            Arc::new(HashEmbedder::new(32)),
            index.clone(),
        )
        .unwrap();
        (ingestor, index)
    }

    #[tokio::test]
    async fn test_second_run_reports_no_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("kb");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "hello world").unwrap();
        let config = config_in(tmp.path());
        let (ingestor, index) = ingestor(&config);
        let cancel = CancellationToken::new();

        let first = ingestor.run(&root, &cancel).await.unwrap();
        assert!(first.is_indexed());
        assert_eq!(index.len().await.unwrap(), 1);

        let second = ingestor.run(&root, &cancel).await.unwrap();
        assert!(matches!(second, IngestOutcome::NoChanges { files_seen: 1 }));
        assert_eq!(index.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_documents_leave_cache_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("kb");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("empty.md"), "   \n\n ").unwrap();
        let config = config_in(tmp.path());
        let (ingestor, _index) = ingestor(&config);

        let outcome = ingestor.run(&root, &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::NoChunks { documents: 1 }));
        assert!(!config.ingest.cache_path.exists());
    }

    #[tokio::test]
    async fn test_batches_respect_batch_size() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("kb");
        fs::create_dir_all(&root).unwrap();
        for i in 0..5 {
            fs::write(root.join(format!("f{}.txt", i)), format!("file number {}", i)).unwrap();
        }
        let mut config = config_in(tmp.path());
        config.embedding.batch_size = 2;
        let (ingestor, index) = ingestor(&config);

        let outcome = ingestor.run(&root, &CancellationToken::new()).await.unwrap();
        match outcome {
            IngestOutcome::Indexed(report) => {
                assert_eq!(report.chunks, 5);
                assert_eq!(report.cache_entries, 5);
            }
            other => panic!("expected Indexed, got {:?}", other),
        }
        assert_eq!(index.len().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_loader_panic_is_reported_as_panic() {
        let err = run_loader(|| panic!("bad xref table")).await.unwrap_err();
        assert!(matches!(err, LoadError::Panicked(_)));
        assert!(err.to_string().starts_with("loader panicked"));
    }

    #[tokio::test]
    async fn test_text_file_loads_off_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        fs::write(&path, "plain notes").unwrap();

        let docs = load_blocking(&path).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].text, "plain notes");
    }

    #[test]
    fn test_report_display() {
        let report = IngestReport {
            files_seen: 2,
            files_changed: 2,
            files_loaded: 1,
            failed: vec![FailedFile {
                path: PathBuf::from("bad.pdf"),
                error: "PDF extraction failed: eof".into(),
            }],
            documents: 1,
            chunks: 3,
            cache_entries: 1,
            elapsed: Duration::from_millis(1500),
        };
        let text = report.to_string();
        assert!(text.starts_with("ingest\n"));
        assert!(text.contains("  failed: bad.pdf (PDF extraction failed: eof)"));
        assert!(text.contains("  chunks indexed: 3"));
        assert!(text.ends_with("ok"));
    }
}
