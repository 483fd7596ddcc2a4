//! Typed errors for the ingestion pipeline.
//!
//! Run-level plumbing uses `anyhow`; these enums name the conditions that
//! callers match on: per-file load failures (logged and skipped) and the
//! sentinels that stop a run before it touches the cache.

use std::path::PathBuf;

/// Failure to turn one file into documents. Never fatal to a run.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),

    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("loader panicked: {0}")]
    Panicked(String),
}

/// Conditions that end an ingestion run early with the cache untouched.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("ingestion root does not exist or is not a directory: {0}")]
    RootMissing(PathBuf),

    #[error("ingestion already running (lock file {0} exists)")]
    Locked(PathBuf),

    #[error("ingestion cancelled")]
    Cancelled,
}
