//! Router tests against the in-memory store.
//!
//! Requests go through the full middleware stack with `tower::ServiceExt`,
//! so request ids, error bodies and SSE headers are exercised as served.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

use atomic_api::{router, AppState};
use atomic_core::{
    DetectedRelationship, Error, ExtractedEntity, ExtractionOracle, Job, JobRepository, JobType,
    Result,
};
use atomic_db::{MemoryStore, Stores};
use atomic_inference::MockEmbedding;
use atomic_pipeline::PipelineOrchestrator;
use atomic_search::SemanticSearch;

const ORIGINS: &str = "http://localhost:5173";

struct FixedOracle;

#[async_trait]
impl ExtractionOracle for FixedOracle {
    async fn extract_entities(&self, _text: &str) -> Result<Vec<ExtractedEntity>> {
        Ok(vec![
            ExtractedEntity::new("Rust", "technology", "systems language"),
            ExtractedEntity::new("Tokio", "technology", "async runtime"),
        ])
    }

    async fn detect_relationships(
        &self,
        _names: &[String],
        _context: &str,
    ) -> Result<Vec<DetectedRelationship>> {
        Ok(vec![DetectedRelationship {
            source: "Tokio".to_string(),
            target: "Rust".to_string(),
            relationship_type: "built_with".to_string(),
            strength: 0.9,
            explanation: None,
        }])
    }
}

/// Job queue whose reads fail.
struct BrokenJobs;

#[async_trait]
impl JobRepository for BrokenJobs {
    async fn queue(
        &self,
        _note_id: Option<Uuid>,
        _job_type: JobType,
        _priority: i32,
        _payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        Err(Error::Internal("queue offline".into()))
    }
    async fn claim_next_for_types(&self, _job_types: &[JobType]) -> Result<Option<Job>> {
        Ok(None)
    }
    async fn update_progress(
        &self,
        _job_id: Uuid,
        _percent: i32,
        _stage: Option<&str>,
        _message: Option<&str>,
    ) -> Result<()> {
        Ok(())
    }
    async fn complete(&self, _job_id: Uuid, _result: Option<JsonValue>) -> Result<()> {
        Ok(())
    }
    async fn fail(&self, _job_id: Uuid, _error: &str) -> Result<()> {
        Ok(())
    }
    async fn get(&self, _job_id: Uuid) -> Result<Option<Job>> {
        Err(Error::Internal("connection reset".into()))
    }
    async fn pending_count(&self) -> Result<i64> {
        Ok(0)
    }
}

fn app_with(stores: Stores) -> Router {
    let embedder = Arc::new(MockEmbedding::deterministic());
    let orchestrator = PipelineOrchestrator::new(
        stores.notes.clone(),
        stores.graph.clone(),
        Arc::new(FixedOracle),
        embedder.clone(),
    );
    let search = SemanticSearch::new(stores.search.clone(), embedder);
    router(AppState::new(stores, orchestrator, search), ORIGINS)
}

fn app() -> (Router, MemoryStore) {
    let store = MemoryStore::new();
    (app_with(Stores::from(store.clone())), store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<JsonValue>) -> (StatusCode, JsonValue) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let (status, _, text) = send(app, request).await;
    let value = serde_json::from_str(&text).unwrap_or(JsonValue::Null);
    (status, value)
}

async fn create_note(app: &Router, title: &str, content: &str) -> Uuid {
    let (status, body) = send_json(
        app,
        Method::POST,
        "/api/notes",
        Some(json!({ "title": title, "content": content })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    Uuid::parse_str(body["note_id"].as_str().unwrap()).unwrap()
}

/// `data:` payloads of an SSE body.
fn sse_frames(body: &str) -> Vec<JsonValue> {
    body.lines()
        .filter_map(|l| l.strip_prefix("data: ").or_else(|| l.strip_prefix("data:")))
        .filter_map(|d| serde_json::from_str(d.trim()).ok())
        .collect()
}

async fn process(app: &Router, note_id: Uuid) -> (StatusCode, axum::http::HeaderMap, Vec<JsonValue>) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/notes/{note_id}/process"))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(app, request).await;
    (status, headers, sse_frames(&body))
}

fn multipart_upload(filename: &str, content: &[u8]) -> Request<Body> {
    let boundary = "XBOUNDARYX";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    Request::builder()
        .method(Method::POST)
        .uri("/api/notes/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

// =============================================================================
// HEALTH / MIDDLEWARE
// =============================================================================

#[tokio::test]
async fn test_health_and_request_id_header() {
    let (app, _) = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    let id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(atomic_core::is_v7(&Uuid::parse_str(id).unwrap()));
}

#[tokio::test]
async fn test_error_body_carries_request_id() {
    let (app, _) = app();
    let request = Request::builder()
        .uri(format!("/api/notes/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["error"], "Note not found");
    assert_eq!(
        body["request_id"].as_str().unwrap(),
        headers.get("x-request-id").unwrap().to_str().unwrap()
    );
}

// =============================================================================
// NOTES
// =============================================================================

#[tokio::test]
async fn test_upload_and_fetch() {
    let (app, _) = app();
    let (status, _, body) = send(&app, multipart_upload("ideas.md", "# Rust\nTokio runs futures.".as_bytes())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let body: JsonValue = serde_json::from_str(&body).unwrap();
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["title"], "ideas.md");
    assert_eq!(body["content_length"], 26);

    let note_id = body["note_id"].as_str().unwrap();
    let (status, note) = send_json(&app, Method::GET, &format!("/api/notes/{note_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(note["source_file"], "ideas.md");
    assert_eq!(note["content"], "# Rust\nTokio runs futures.");
    assert!(note.get("embedding").is_none());
}

#[tokio::test]
async fn test_upload_rejects_other_types_and_bad_utf8() {
    let (app, _) = app();
    let (status, _, body) = send(&app, multipart_upload("paper.pdf", b"%PDF")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Only .txt and .md files are supported"));

    let (status, _, body) = send(&app, multipart_upload("notes.txt", &[0xff, 0xfe, 0x00])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("UTF-8"));
}

#[tokio::test]
async fn test_process_streams_progress_then_graph() {
    let (app, store) = app();
    let note_id = create_note(&app, "Async", "Tokio is the async runtime for Rust.").await;

    let (status, headers, frames) = process(&app, note_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    assert_eq!(frames.first().unwrap()["stage"], "start");
    let last = frames.last().unwrap();
    assert_eq!(last["stage"], "complete");
    assert_eq!(last["progress"], 100);
    let progress: Vec<u64> = frames.iter().map(|f| f["progress"].as_u64().unwrap()).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

    let (status, graph) = send_json(&app, Method::GET, &format!("/api/notes/{note_id}/graph"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["entities"].as_array().unwrap().len(), 2);
    assert_eq!(graph["relationships"].as_array().unwrap().len(), 1);
    assert_eq!(store.entity_count(), 2);

    let (_, list) = send_json(&app, Method::GET, "/api/notes", None).await;
    assert_eq!(list["notes"][0]["entity_count"], 2);
}

#[tokio::test]
async fn test_process_missing_note_is_404_before_streaming() {
    let (app, _) = app();
    let (status, headers, frames) = process(&app, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(frames.is_empty());
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}

#[tokio::test]
async fn test_delete_cascades() {
    let (app, store) = app();
    let note_id = create_note(&app, "Async", "Tokio and Rust.").await;
    process(&app, note_id).await;
    assert_eq!(store.entity_count(), 2);

    let (status, body) = send_json(&app, Method::DELETE, &format!("/api/notes/{note_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["message"], "Note 'Async' and all associated data deleted successfully");
    assert_eq!(store.entity_count(), 0);
    assert_eq!(store.relationship_count(), 0);

    let (status, _) = send_json(&app, Method::GET, &format!("/api/notes/{note_id}/graph"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, Method::DELETE, &format!("/api/notes/{note_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// TOPICS / ANNOTATIONS
// =============================================================================

#[tokio::test]
async fn test_topic_lifecycle() {
    let (app, _) = app();
    let (status, topic) = send_json(&app, Method::POST, "/api/topics", Some(json!({ "name": "Systems" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(topic["emoji"], "📚");
    let topic_id = topic["id"].as_str().unwrap().to_string();

    let (status, note) = send_json(
        &app,
        Method::POST,
        "/api/notes",
        Some(json!({ "title": "In topic", "content": "Rust", "topic_id": topic_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let note_id = Uuid::parse_str(note["note_id"].as_str().unwrap()).unwrap();
    process(&app, note_id).await;

    let (_, topics) = send_json(&app, Method::GET, "/api/topics", None).await;
    assert_eq!(topics.as_array().unwrap().len(), 1);
    let (status, graph) = send_json(&app, Method::GET, &format!("/api/topics/{topic_id}/graph"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graph["entities"].as_array().unwrap().len(), 2);

    let missing = Uuid::new_v4();
    let (status, _) = send_json(&app, Method::GET, &format!("/api/topics/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, Method::GET, &format!("/api/topics/{missing}/graph"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, Method::POST, "/api/topics", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_annotation_lifecycle() {
    let (app, store) = app();
    let note_id = create_note(&app, "Async", "Tokio and Rust.").await;
    process(&app, note_id).await;
    let entity_id = store.entities_for_note(note_id)[0].id;

    let (status, created) = send_json(
        &app,
        Method::POST,
        "/api/annotations",
        Some(json!({ "entity_id": entity_id, "user_note": "check the book" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let annotation_id = created["id"].as_str().unwrap().to_string();

    let (_, listed) = send_json(&app, Method::GET, &format!("/api/annotations/entity/{entity_id}"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = send_json(
        &app,
        Method::PUT,
        &format!("/api/annotations/{annotation_id}"),
        Some(json!({ "user_note": "read chapter 3" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["user_note"], "read chapter 3");

    let (status, _) = send_json(&app, Method::DELETE, &format!("/api/annotations/{annotation_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, Method::GET, &format!("/api/annotations/{annotation_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let unknown = Uuid::new_v4();
    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/annotations",
        Some(json!({ "entity_id": unknown, "user_note": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&app, Method::GET, &format!("/api/annotations/entity/{unknown}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// SEARCH
// =============================================================================

#[tokio::test]
async fn test_search_semantic_and_validation() {
    let (app, _) = app();
    let note_id = create_note(&app, "Async", "Tokio and Rust.").await;
    process(&app, note_id).await;

    // Entities are embedded from "name - description"; the same text scores 1.0.
    let (status, body) = send_json(
        &app,
        Method::GET,
        "/api/search?q=Rust%20-%20systems%20language&limit=5&min_similarity=0.99",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["mode"], "semantic");
    assert_eq!(body["fallback"], false);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["name"], "Rust");

    let (status, body) = send_json(&app, Method::GET, "/api/search?q=Tokio%20and%20Rust.&target=notes&min_similarity=0.99", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = send_json(&app, Method::GET, "/api/search?q=", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_json(&app, Method::GET, "/api/search?q=x&limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_related_excludes_self() {
    let (app, store) = app();
    let note_id = create_note(&app, "Async", "Tokio and Rust.").await;
    process(&app, note_id).await;
    let entity_id = store.entities_for_note(note_id)[0].id;

    let (status, body) = send_json(
        &app,
        Method::GET,
        &format!("/api/search/related/{entity_id}?min_similarity=-1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_ne!(body["results"][0]["id"], json!(entity_id));
}

// =============================================================================
// YOUTUBE
// =============================================================================

#[tokio::test]
async fn test_youtube_submit_and_poll() {
    let (app, _) = app();
    let url = "https://youtu.be/dQw4w9WgXcQ";
    let (status, body) = send_json(&app, Method::POST, "/api/youtube/process", Some(json!({ "url": url }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");

    let note_id = body["note_id"].as_str().unwrap();
    let (_, note) = send_json(&app, Method::GET, &format!("/api/notes/{note_id}"), None).await;
    assert_eq!(note["title"], format!("YouTube Video: {url}"));
    assert_eq!(note["content"], "Processing in progress...");
    assert_eq!(note["note_metadata"]["source"], "youtube");

    let job_id = body["job_id"].as_str().unwrap();
    let (status, poll) = send_json(&app, Method::GET, &format!("/api/youtube/status/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "queued");
    assert_eq!(poll["progress"], 0);
    assert_eq!(poll["stage"], "starting");
    assert_eq!(poll["message"], "Initializing...");
}

#[tokio::test]
async fn test_youtube_rejects_bad_url() {
    let (app, store) = app();
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/youtube/process",
        Some(json!({ "url": "https://example.com/watch" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Invalid YouTube URL"));
    assert!(atomic_core::NoteRepository::list(&store).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_youtube_status_unknown_and_backend_failure() {
    let (app, _) = app();
    let (status, _) = send_json(&app, Method::GET, &format!("/api/youtube/status/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut stores = Stores::from(MemoryStore::new());
    stores.jobs = Arc::new(BrokenJobs);
    let app = app_with(stores);
    let (status, poll) = send_json(&app, Method::GET, &format!("/api/youtube/status/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(poll["status"], "failed");
    assert_eq!(poll["stage"], "error");
    assert!(poll["message"]
        .as_str()
        .unwrap()
        .starts_with("Error retrieving status:"));
}
