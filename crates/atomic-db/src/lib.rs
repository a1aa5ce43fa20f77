//! # atomic-db
//!
//! PostgreSQL + pgvector database layer for the atomic notes knowledge graph.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for notes, topics, annotations and jobs
//! - Transactional graph persistence for pipeline runs
//! - Cosine-similarity search with pgvector, plus a substring fallback
//! - An in-memory store implementing every repository trait, for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use atomic_db::{Database, NoteRepository, CreateNoteRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/atomic").await?;
//!
//!     let note_id = db.notes.insert(CreateNoteRequest {
//!         title: "Ownership".to_string(),
//!         content: "Rust tracks ownership at compile time.".to_string(),
//!         ..Default::default()
//!     }).await?;
//!
//!     println!("Created note: {}", note_id);
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod annotations;
pub mod graph;
pub mod jobs;
pub mod memory;
pub mod notes;
pub mod pool;
pub mod topics;
pub mod vector_search;

pub use annotations::PgAnnotationRepository;
pub use graph::{PgGraphRepository, PgGraphTransaction};
pub use jobs::PgJobRepository;
pub use memory::{FailPoint, MemoryStore};
pub use notes::PgNoteRepository;
pub use pool::{create_pool_with_config, log_pool_metrics, PoolConfig};
pub use topics::PgTopicRepository;
pub use vector_search::PgVectorSearch;

// Re-export core types for consumers that only depend on this crate
pub use atomic_core::*;

/// Escape `%`, `_` and `\` for use inside a LIKE/ILIKE pattern.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// PostgreSQL-backed repositories sharing one connection pool.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub notes: PgNoteRepository,
    pub graph: PgGraphRepository,
    pub topics: PgTopicRepository,
    pub annotations: PgAnnotationRepository,
    pub jobs: PgJobRepository,
    pub search: PgVectorSearch,
}

impl Database {
    /// Create a Database from an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            notes: PgNoteRepository::new(pool.clone()),
            graph: PgGraphRepository::new(pool.clone()),
            topics: PgTopicRepository::new(pool.clone()),
            annotations: PgAnnotationRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            search: PgVectorSearch::new(pool.clone()),
            pool,
        }
    }

    /// Connect with the default pool configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    /// Connect with a custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Trait-object view of these repositories.
    pub fn stores(&self) -> Stores {
        Stores {
            notes: Arc::new(self.notes.clone()),
            graph: Arc::new(self.graph.clone()),
            topics: Arc::new(self.topics.clone()),
            annotations: Arc::new(self.annotations.clone()),
            search: Arc::new(self.search.clone()),
            backfill: Arc::new(self.search.clone()),
            jobs: Arc::new(self.jobs.clone()),
        }
    }
}

/// Every repository behind its trait, so services run unchanged against
/// PostgreSQL or [`MemoryStore`].
#[derive(Clone)]
pub struct Stores {
    pub notes: Arc<dyn NoteRepository>,
    pub graph: Arc<dyn GraphRepository>,
    pub topics: Arc<dyn TopicRepository>,
    pub annotations: Arc<dyn AnnotationRepository>,
    pub search: Arc<dyn VectorSearchRepository>,
    pub backfill: Arc<dyn EmbeddingBackfillRepository>,
    pub jobs: Arc<dyn JobRepository>,
}

impl From<MemoryStore> for Stores {
    fn from(store: MemoryStore) -> Self {
        Self {
            notes: Arc::new(store.clone()),
            graph: Arc::new(store.clone()),
            topics: Arc::new(store.clone()),
            annotations: Arc::new(store.clone()),
            search: Arc::new(store.clone()),
            backfill: Arc::new(store.clone()),
            jobs: Arc::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("snake_case"), "snake\\_case");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
