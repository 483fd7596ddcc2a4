//! # kb-harness core
//!
//! Filesystem-free logic shared by the `kb` binary and its tests: data
//! models, the recursive text splitter, the [`Embedder`](embedding::Embedder)
//! and [`VectorIndex`](index::VectorIndex) seams, and best-effort context
//! retrieval.
//!
//! Nothing in this crate touches the disk or the network. File collection,
//! change detection, format loading, and the persistent index live in the
//! `kb-harness` crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod retrieval;
