//! TOML configuration.
//!
//! Every section is optional; an absent file behaves like an empty one.
//! The parsed [`Config`] is passed explicitly into the ingestor, the index,
//! and the embedder constructors. Only secrets (`OPENAI_API_KEY`) are read
//! from the environment.
//!
//! ```toml
//! [ingest]
//! cache_path = "./vectorstore/.ingest_cache.json"
//! extensions = ["py", "md", "txt", "json", "docx", "pdf"]
//!
//! [index]
//! path = "./vectorstore"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! k = 5
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kb_harness_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// JSON file mapping each ingested path to its SHA-256 fingerprint.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// File extensions to collect, without the leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Globs matched against root-relative paths; matches are skipped.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            extensions: default_extensions(),
            exclude_globs: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Lock file guarding the cache against concurrent ingestion runs.
    pub fn lock_path(&self) -> PathBuf {
        match self.cache_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(".ingest.lock"),
            _ => PathBuf::from(".ingest.lock"),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./vectorstore/.ingest_cache.json")
}

fn default_extensions() -> Vec<String> {
    ["py", "md", "txt", "json", "docx", "pdf"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persistent vector index.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./vectorstore")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// One of `disabled`, `openai`, `ollama`, `hash`, `local`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl Config {
    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
        }
        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }
        if self.ingest.extensions.is_empty() {
            bail!("ingest.extensions must not be empty");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }

        let embedding = &self.embedding;
        match embedding.provider.as_str() {
            "disabled" | "hash" | "local" => {}
            "openai" | "ollama" => {
                if embedding.model.is_none() {
                    bail!(
                        "embedding.model must be specified when provider is '{}'",
                        embedding.provider
                    );
                }
                if embedding.dims.is_none() || embedding.dims == Some(0) {
                    bail!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        embedding.provider
                    );
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
                other
            ),
        }
        if embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists, otherwise fall back to the defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}
