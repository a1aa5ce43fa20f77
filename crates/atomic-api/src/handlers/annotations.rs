//! User annotations on entities.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAnnotationBody {
    pub entity_id: Uuid,
    pub user_note: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnnotationBody {
    pub user_note: String,
}

fn annotation_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Annotation {} not found", id))
}

pub async fn create_annotation(
    State(state): State<AppState>,
    Json(body): Json<CreateAnnotationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state
        .stores
        .annotations
        .create(body.entity_id, &body.user_note)
        .await?;
    Ok((StatusCode::CREATED, Json(annotation)))
}

/// Newest first. 404 when the entity does not exist.
pub async fn list_entity_annotations(
    State(state): State<AppState>,
    Path(entity_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.stores.graph.fetch_entity(entity_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Entity {} not found", entity_id)));
    }
    Ok(Json(
        state.stores.annotations.list_for_entity(entity_id).await?,
    ))
}

pub async fn get_annotation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state
        .stores
        .annotations
        .fetch(id)
        .await?
        .ok_or_else(|| annotation_not_found(id))?;
    Ok(Json(annotation))
}

pub async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAnnotationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let annotation = state
        .stores
        .annotations
        .update(id, &body.user_note)
        .await?
        .ok_or_else(|| annotation_not_found(id))?;
    Ok(Json(annotation))
}

pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.stores.annotations.delete(id).await? {
        return Err(annotation_not_found(id));
    }
    Ok(Json(json!({
        "message": format!("Annotation {} deleted successfully", id)
    })))
}
