//! Note catalog endpoints and the live processing stream.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use futures::Stream;
use serde_json::{json, Value as JsonValue};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;
use tower_http::request_id::RequestId;
use tracing::{info, warn};
use uuid::Uuid;

use atomic_core::{
    defaults, ChannelProgress, CreateNoteRequest, Error, PipelineStage, ProgressEvent,
};

use crate::error::ApiError;
use crate::middleware::request_id_str;
use crate::state::AppState;

const ALLOWED_EXTENSIONS: [&str; 2] = [".txt", ".md"];

/// `POST /api/notes/upload`: multipart `file` (.txt / .md) and optional
/// `topic_id`.
pub async fn upload_note(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut topic_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("topic_id") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Read error: {}", e)))?;
                if !raw.trim().is_empty() {
                    topic_id = Some(
                        Uuid::parse_str(raw.trim())
                            .map_err(|_| ApiError::BadRequest("Invalid topic_id".into()))?,
                    );
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::BadRequest("No file provided".into()))?;
    if !ALLOWED_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        return Err(ApiError::BadRequest(
            "Only .txt and .md files are supported".into(),
        ));
    }
    let content = String::from_utf8(bytes)
        .map_err(|_| ApiError::BadRequest("File is not valid UTF-8 text".into()))?;
    let content_length = content.chars().count();

    let note_id = state
        .stores
        .notes
        .insert(CreateNoteRequest {
            title: filename.clone(),
            content,
            source_file: Some(filename.clone()),
            topic_id,
            metadata: None,
        })
        .await?;
    info!(subsystem = "api", %note_id, filename = %filename, "Note uploaded");

    Ok(Json(json!({
        "note_id": note_id,
        "title": filename,
        "content_length": content_length,
        "status": "uploaded",
        "message": "Note uploaded successfully. Call /process to extract entities.",
    })))
}

/// `POST /api/notes`
pub async fn create_note(
    State(state): State<AppState>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".into()));
    }
    let title = req.title.clone();
    let content_length = req.content.chars().count();
    let note_id = state.stores.notes.insert(req).await?;
    info!(subsystem = "api", %note_id, "Note created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "note_id": note_id,
            "title": title,
            "content_length": content_length,
            "status": "created",
        })),
    ))
}

pub async fn list_notes(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let notes = state.stores.notes.list().await?;
    Ok(Json(json!({ "notes": notes })))
}

pub async fn get_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let note = state
        .stores
        .notes
        .fetch(note_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Note not found".into()))?;
    Ok(Json(note))
}

/// `DELETE /api/notes/{id}`: note, entities, relationships, annotations.
pub async fn delete_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.stores.graph.delete_note_cascade(note_id).await?;
    info!(
        subsystem = "api",
        %note_id,
        entities_deleted = summary.entities_deleted,
        relationships_deleted = summary.relationships_deleted,
        "Note deleted"
    );
    Ok(Json(json!({
        "note_id": summary.note_id,
        "title": summary.title,
        "status": "deleted",
        "message": format!(
            "Note '{}' and all associated data deleted successfully",
            summary.title
        ),
        "entities_deleted": summary.entities_deleted,
        "relationships_deleted": summary.relationships_deleted,
    })))
}

pub async fn note_graph(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let graph = state.stores.graph.note_graph(note_id).await?;
    Ok(Json(graph))
}

/// SSE frame for one progress event. Error frames carry the request id.
fn progress_frame(event: &ProgressEvent, request_id: &str) -> Event {
    let mut data = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    if event.stage == PipelineStage::Error {
        if let JsonValue::Object(map) = &mut data {
            map.insert("request_id".into(), json!(request_id));
        }
    }
    Event::default().data(data.to_string())
}

/// `POST /api/notes/{id}/process`: run the pipeline, streaming progress as
/// server-sent events. 404 before streaming when the note does not exist.
///
/// The run continues if the client disconnects.
pub async fn process_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    request_id: Option<Extension<RequestId>>,
) -> Result<impl IntoResponse, ApiError> {
    if state.stores.notes.fetch(note_id).await?.is_none() {
        return Err(ApiError::NotFound("Note not found".into()));
    }
    let request_id = request_id_str(request_id.as_ref().map(|Extension(id)| id));

    let (sink, rx) = ChannelProgress::channel();
    let orchestrator = state.orchestrator.clone();
    let run_request_id = request_id.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(note_id, &sink).await {
            if !matches!(e, Error::InvalidInput(_)) {
                warn!(subsystem = "api", %note_id, request_id = %run_request_id, error = %e, "Streamed run failed");
            }
        }
    });

    let stream: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> = Box::pin(
        UnboundedReceiverStream::new(rx).map(move |event| Ok(progress_frame(&event, &request_id))),
    );

    let headers = [
        (header::CACHE_CONTROL, "no-cache"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];
    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(defaults::SSE_KEEPALIVE_SECS))
            .text("keepalive"),
    );
    Ok((headers, sse))
}
