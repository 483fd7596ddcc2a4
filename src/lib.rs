//! # KB Harness
//!
//! Incremental ingestion of a source-document directory into a vector
//! index, and top-k retrieval of context for a downstream generation step.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌────────────┐
//! │  Collect   │──▶│ Diff cache │──▶│    Load    │──▶│   Chunk    │
//! │  walkdir   │   │  SHA-256   │   │ txt/pdf/.. │   │ recursive  │
//! └────────────┘   └────────────┘   └────────────┘   └─────┬──────┘
//!                                                          ▼
//!                  ┌────────────┐   ┌────────────┐   ┌────────────┐
//!                  │ Save cache │◀──│   Index    │◀──│   Embed    │
//!                  │ temp+rename│   │   SQLite   │   │  batched   │
//!                  └────────────┘   └─────┬──────┘   └────────────┘
//!                                         ▼
//!                                   ┌────────────┐
//!                                   │  Retrieve  │
//!                                   └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb ingest ./knowledge_base        # index new and modified files
//! kb retrieve "list users" --k 3    # print context for a query
//! kb contents                       # dump every stored chunk
//! kb prune ./knowledge_base         # drop deleted files
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`hasher`] | Streaming file fingerprints |
//! | [`cache`] | Path → fingerprint change cache |
//! | [`collect`] | Directory walk with extension filter |
//! | [`loader`] | Text, PDF and DOCX loading |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_index`] | Persistent vector index |
//! | [`ingest`] | Ingestion coordinator and prune |
//! | [`retrieve`] | Best-effort retrieval entry points |
//! | [`lock`] | Single-writer ingest lock |
//! | [`error`] | Typed errors |
//!
//! Chunking, the index trait, and the retrieval core live in
//! `kb-harness-core`.

pub mod cache;
pub mod collect;
pub mod config;
pub mod embedding;
pub mod error;
pub mod hasher;
pub mod ingest;
pub mod loader;
pub mod lock;
pub mod retrieve;
pub mod sqlite_index;
