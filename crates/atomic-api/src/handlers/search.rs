//! Semantic search endpoints.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use atomic_core::{defaults, SearchTarget};
use atomic_search::SearchRequest;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/search?q&limit&min_similarity&target&use_mock`
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<i64>,
    pub min_similarity: Option<f64>,
    pub target: Option<SearchTarget>,
    pub use_mock: Option<bool>,
}

impl SearchQuery {
    fn into_request(self) -> SearchRequest {
        let mut request = SearchRequest::new(self.q)
            .with_target(self.target.unwrap_or_default());
        if let Some(limit) = self.limit {
            request = request.with_limit(limit);
        }
        if let Some(min) = self.min_similarity {
            request = request.with_min_similarity(min);
        }
        if let Some(use_mock) = self.use_mock {
            request = request.with_mock(use_mock);
        }
        request
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.search.search(&query.into_request()).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct RelatedQuery {
    pub limit: Option<i64>,
    pub min_similarity: Option<f64>,
}

/// `GET /api/search/related/{entity_id}`
pub async fn related(
    State(state): State<AppState>,
    Path(entity_id): Path<Uuid>,
    Query(query): Query<RelatedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state
        .search
        .related(
            entity_id,
            query.limit.unwrap_or(defaults::RELATED_LIMIT),
            query
                .min_similarity
                .unwrap_or(defaults::RELATED_MIN_SIMILARITY),
        )
        .await?;
    Ok(Json(json!({
        "entity_id": entity_id,
        "count": results.len(),
        "results": results,
    })))
}
