//! Semantic search over entities and notes.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, warn};
use uuid::Uuid;

use atomic_core::{
    defaults, EmbeddingBackend, EntityMatch, Error, Result, SearchTarget, Vector,
    VectorSearchRepository,
};
use atomic_inference::mock_embedding;

use crate::request::{SearchMode, SearchRequest, SearchResponse, SearchResults};

/// Embeds the query, ranks stored vectors by cosine similarity, and drops to
/// substring matching when any part of the vector path fails.
#[derive(Clone)]
pub struct SemanticSearch {
    store: Arc<dyn VectorSearchRepository>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl SemanticSearch {
    pub fn new(store: Arc<dyn VectorSearchRepository>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { store, embedder }
    }

    #[instrument(skip(self, request), fields(
        subsystem = "search",
        component = "semantic_search",
        op = "search",
        target = ?request.target,
        use_mock = request.use_mock,
    ))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        request.validate()?;
        let start = Instant::now();
        let query = request.query.trim();

        let response = match self.vector_search(query, request).await {
            Ok(results) => SearchResponse::new(query, SearchMode::Semantic, results),
            Err(e) => {
                warn!(
                    error = %e,
                    "Vector search failed, falling back to text search"
                );
                let results = self.text_search(query, request).await?;
                SearchResponse::new(query, SearchMode::Text, results)
            }
        };

        debug!(
            result_count = response.count,
            fallback = response.fallback,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(response)
    }

    /// Entities nearest to `entity_id`, excluding itself. Empty when the
    /// entity has no embedding.
    #[instrument(skip(self), fields(subsystem = "search", component = "semantic_search", op = "related"))]
    pub async fn related(
        &self,
        entity_id: Uuid,
        limit: i64,
        min_similarity: f64,
    ) -> Result<Vec<EntityMatch>> {
        if limit < 1 {
            return Err(Error::InvalidInput(format!("limit must be positive, got {limit}")));
        }
        self.store
            .related_entities(entity_id, limit, min_similarity)
            .await
    }

    /// [`related`](Self::related) with the default limit and threshold.
    pub async fn related_default(&self, entity_id: Uuid) -> Result<Vec<EntityMatch>> {
        self.related(
            entity_id,
            defaults::RELATED_LIMIT,
            defaults::RELATED_MIN_SIMILARITY,
        )
        .await
    }

    async fn query_embedding(&self, query: &str, use_mock: bool) -> Result<Vector> {
        if use_mock {
            return Ok(mock_embedding(query));
        }
        self.embedder
            .embed_texts(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("Provider returned no query embedding".to_string()))
    }

    async fn vector_search(&self, query: &str, request: &SearchRequest) -> Result<SearchResults> {
        let embedding = self.query_embedding(query, request.use_mock).await?;
        Ok(match request.target {
            SearchTarget::Entities => SearchResults::Entities(
                self.store
                    .search_entities(&embedding, request.limit, request.min_similarity)
                    .await?,
            ),
            SearchTarget::Notes => SearchResults::Notes(
                self.store
                    .search_notes(&embedding, request.limit, request.min_similarity)
                    .await?,
            ),
        })
    }

    async fn text_search(&self, query: &str, request: &SearchRequest) -> Result<SearchResults> {
        let results = match request.target {
            SearchTarget::Entities => {
                SearchResults::Entities(self.store.text_search_entities(query, request.limit).await?)
            }
            SearchTarget::Notes => {
                SearchResults::Notes(self.store.text_search_notes(query, request.limit).await?)
            }
        };
        Ok(results)
    }
}
