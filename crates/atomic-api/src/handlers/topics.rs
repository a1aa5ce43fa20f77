//! Topic workspaces.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use atomic_core::CreateTopicRequest;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_topic(
    State(state): State<AppState>,
    Json(req): Json<CreateTopicRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let topic = state.stores.topics.create(req).await?;
    tracing::info!(subsystem = "api", topic_id = %topic.id, "Topic created");
    Ok((StatusCode::CREATED, Json(topic)))
}

pub async fn list_topics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.stores.topics.list().await?))
}

pub async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let topic = state
        .stores
        .topics
        .fetch(topic_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Topic not found".into()))?;
    Ok(Json(topic))
}

/// Merged graph of every note in the topic.
pub async fn topic_graph(
    State(state): State<AppState>,
    Path(topic_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.stores.graph.topic_graph(topic_id).await?))
}
