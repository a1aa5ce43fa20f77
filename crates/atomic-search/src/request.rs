//! Search request and response types.

use serde::Serialize;

use atomic_core::{defaults, EntityMatch, Error, NoteMatch, Result, SearchTarget};

/// Largest `limit` accepted from callers.
pub const MAX_SEARCH_LIMIT: i64 = 100;

/// A semantic search over entities or notes.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: i64,
    pub min_similarity: f64,
    pub target: SearchTarget,
    /// Embed the query with the deterministic mock generator instead of the
    /// configured provider.
    pub use_mock: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: defaults::SEARCH_LIMIT,
            min_similarity: defaults::SEARCH_MIN_SIMILARITY,
            target: SearchTarget::Entities,
            use_mock: true,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_target(mut self, target: SearchTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_mock(mut self, use_mock: bool) -> Self {
        self.use_mock = use_mock;
        self
    }

    /// Reject blank queries and out-of-range parameters.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidInput("Search query must not be empty".to_string()));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&self.limit) {
            return Err(Error::InvalidInput(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {}",
                self.limit
            )));
        }
        if !(0.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::InvalidInput(format!(
                "min_similarity must be between 0 and 1, got {}",
                self.min_similarity
            )));
        }
        Ok(())
    }
}

/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Cosine-similarity ranking over embeddings.
    Semantic,
    /// Substring fallback after a vector-search failure.
    Text,
}

/// Hits of either collection. Serializes as a bare array.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SearchResults {
    Entities(Vec<EntityMatch>),
    Notes(Vec<NoteMatch>),
}

impl SearchResults {
    pub fn len(&self) -> usize {
        match self {
            SearchResults::Entities(hits) => hits.len(),
            SearchResults::Notes(hits) => hits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `{query, mode, fallback, results, count}`
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub fallback: bool,
    pub results: SearchResults,
    pub count: usize,
}

impl SearchResponse {
    pub(crate) fn new(query: &str, mode: SearchMode, results: SearchResults) -> Self {
        Self {
            query: query.to_string(),
            mode,
            fallback: mode == SearchMode::Text,
            count: results.len(),
            results,
        }
    }
}
