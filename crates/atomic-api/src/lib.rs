//! # atomic-api
//!
//! HTTP surface of the atomic notes knowledge graph: note upload and
//! catalog, live pipeline runs streamed as server-sent events, graph reads,
//! topics, annotations, semantic search and YouTube ingestion jobs.
//!
//! Every request gets a UUIDv7 `x-request-id`, recorded on the request span
//! and returned in error bodies.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod state;

use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::{parse_allowed_origins, ServerConfig, BODY_LIMIT_BYTES};
pub use error::ApiError;
pub use state::AppState;

use handlers::{annotations, health, notes, search, topics, youtube};
use middleware::{attach_request_id, make_request_span, MakeRequestUuidV7};

/// Build the application router. `cors_origins` is the raw comma-separated
/// origin list.
pub fn router(state: AppState, cors_origins: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(parse_allowed_origins(cors_origins)))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        // Notes
        .route("/api/notes", post(notes::create_note).get(notes::list_notes))
        .route("/api/notes/upload", post(notes::upload_note))
        .route(
            "/api/notes/:note_id",
            get(notes::get_note).delete(notes::delete_note),
        )
        .route("/api/notes/:note_id/process", post(notes::process_note))
        .route("/api/notes/:note_id/graph", get(notes::note_graph))
        // Topics
        .route(
            "/api/topics",
            post(topics::create_topic).get(topics::list_topics),
        )
        .route("/api/topics/:topic_id", get(topics::get_topic))
        .route("/api/topics/:topic_id/graph", get(topics::topic_graph))
        // Annotations
        .route("/api/annotations", post(annotations::create_annotation))
        .route(
            "/api/annotations/entity/:entity_id",
            get(annotations::list_entity_annotations),
        )
        .route(
            "/api/annotations/:annotation_id",
            get(annotations::get_annotation)
                .put(annotations::update_annotation)
                .delete(annotations::delete_annotation),
        )
        // Search
        .route("/api/search", get(search::search))
        .route("/api/search/related/:entity_id", get(search::related))
        // YouTube
        .route("/api/youtube/process", post(youtube::process_video))
        .route("/api/youtube/status/:job_id", get(youtube::job_status))
        // Middleware
        .layer(axum::middleware::from_fn(attach_request_id))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(CatchPanicLayer::new())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(cors)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .with_state(state)
}
