//! Free-text search over the vector store.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, instrument, trace};

use lumen_core::{defaults, Error, Result, SearchHit, VectorStore};

/// Limits applied to incoming queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Hits returned when the caller does not ask for a number.
    pub default_top_k: usize,
    /// Larger requests are capped to this value.
    pub max_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: defaults::SEARCH_TOP_K,
            max_top_k: defaults::SEARCH_TOP_K_MAX,
        }
    }
}

/// Ranked hits for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    /// Number of hits requested after capping.
    pub top_k: usize,
    pub hits: Vec<SearchHit>,
    pub duration_ms: u64,
}

/// Validates queries and delegates ranking to a [`VectorStore`].
///
/// Store errors are returned as-is; a failing store never looks like an
/// empty result.
pub struct QueryEngine {
    store: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            config: SearchConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search with the default number of hits.
    pub async fn search_default(&self, text: &str) -> Result<Vec<SearchHit>> {
        self.search(text, self.config.default_top_k).await
    }

    /// Up to `top_k` documents ordered by descending similarity to `text`.
    ///
    /// Fails with [`Error::InvalidInput`] for blank text or `top_k == 0`.
    pub async fn search(&self, text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        Ok(self.execute(text, top_k).await?.hits)
    }

    /// Like [`search`](Self::search), with the effective limit and timing.
    #[instrument(skip(self), fields(subsystem = "search", component = "engine", op = "search"))]
    pub async fn execute(&self, text: &str, top_k: usize) -> Result<SearchResponse> {
        let start = Instant::now();
        let query = text.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput(
                "Search query must not be empty".to_string(),
            ));
        }
        if top_k == 0 {
            return Err(Error::InvalidInput("top_k must be at least 1".to_string()));
        }
        let capped = top_k.min(self.config.max_top_k);
        if capped < top_k {
            debug!(requested = top_k, top_k = capped, "top_k capped");
        }

        let hits = self.store.query(query, capped).await?;
        for hit in &hits {
            trace!(path = %hit.document.path(), score = hit.score, "Hit");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(result_count = hits.len(), duration_ms, "Search complete");
        Ok(SearchResponse {
            query: query.to_string(),
            top_k: capped,
            hits,
            duration_ms,
        })
    }

    /// Number of searchable documents.
    pub async fn indexed(&self) -> Result<u64> {
        self.store.count().await
    }
}

/// Builder for a single query.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    text: String,
    top_k: Option<usize>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: None,
        }
    }

    /// Number of hits to return.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub async fn execute(self, engine: &QueryEngine) -> Result<SearchResponse> {
        let top_k = self.top_k.unwrap_or(engine.config.default_top_k);
        engine.execute(&self.text, top_k).await
    }
}
