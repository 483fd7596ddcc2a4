//! Retrieval entry points over the configured on-disk index.
//!
//! [`retrieve`] never fails: if the embedder cannot be built or the index
//! does not exist yet, the caller gets the same `[Vectorstore error: ...]`
//! placeholder the core returns for query failures.

use anyhow::Result;
use tracing::warn;

use kb_harness_core::index::VectorIndex;
use kb_harness_core::retrieval::{retrieve_context, unavailable};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::sqlite_index::SqliteIndex;

/// The `k` chunks nearest to `query`, joined for use as generation context.
///
/// `k` defaults to `retrieval.k`.
pub async fn retrieve(config: &Config, query: &str, k: Option<usize>) -> String {
    let k = k.unwrap_or(config.retrieval.k);

    let embedder = match create_embedder(&config.embedding) {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!(error = %e, "embedder unavailable");
            return unavailable(format!("{:#}", e));
        }
    };
    let index = match SqliteIndex::open_existing(&config.index.path).await {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %e, "index unavailable");
            return unavailable(format!("{:#}", e));
        }
    };

    retrieve_context(embedder.as_ref(), &index, query, k).await
}

/// Every stored chunk text. Works with the embedding provider disabled.
pub async fn contents(config: &Config) -> Result<Vec<String>> {
    let index = SqliteIndex::open_existing(&config.index.path).await?;
    index.contents().await
}
