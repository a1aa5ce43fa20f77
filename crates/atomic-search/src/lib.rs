//! # atomic-search
//!
//! Semantic search for the atomic notes knowledge graph.
//!
//! Queries are embedded either with the deterministic mock generator or the
//! configured embedding provider, then ranked by cosine similarity in the
//! storage layer. When the vector path fails the service answers from a
//! case-insensitive substring match and marks the response as a fallback.
//! [`EmbeddingBackfill`] fills in vectors for rows stored without one.
//!
//! ## Example
//!
//! ```ignore
//! use atomic_search::{SearchRequest, SemanticSearch, SearchTarget};
//!
//! let search = SemanticSearch::new(stores.search.clone(), embedder);
//! let response = search
//!     .search(&SearchRequest::new("ownership").with_target(SearchTarget::Notes))
//!     .await?;
//! ```

pub mod backfill;
pub mod request;
pub mod service;

pub use atomic_core::*;

pub use backfill::{BackfillReport, BackfillScope, EmbeddingBackfill, DEFAULT_BACKFILL_BATCH};
pub use request::{SearchMode, SearchRequest, SearchResponse, SearchResults, MAX_SEARCH_LIMIT};
pub use service::SemanticSearch;
