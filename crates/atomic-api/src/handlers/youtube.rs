//! YouTube ingestion jobs: submit, then poll.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use atomic_core::CreateNoteRequest;
use atomic_jobs::extract_video_id;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProcessVideoBody {
    pub url: String,
    pub topic_id: Option<Uuid>,
}

/// `POST /api/youtube/process`: validate the URL, create the placeholder
/// note the job fills in, queue the job.
pub async fn process_video(
    State(state): State<AppState>,
    Json(body): Json<ProcessVideoBody>,
) -> Result<impl IntoResponse, ApiError> {
    let video_id = extract_video_id(&body.url)?;

    let note_id = state
        .stores
        .notes
        .insert(CreateNoteRequest {
            title: format!("YouTube Video: {}", body.url),
            content: "Processing in progress...".to_string(),
            source_file: None,
            topic_id: body.topic_id,
            metadata: Some(json!({ "source": "youtube", "url": body.url })),
        })
        .await?;
    let job_id = state.jobs.submit_youtube(note_id, &body.url).await?;
    info!(subsystem = "api", %job_id, %note_id, %video_id, "YouTube ingest queued");

    Ok(Json(json!({
        "job_id": job_id,
        "note_id": note_id,
        "status": "queued",
    })))
}

/// `GET /api/youtube/status/{job_id}`. Queue failures come back as a
/// failed response with 200; only unknown ids are 404.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.jobs.poll(job_id).await?))
}
