//! Request correlation: UUIDv7 request ids, span fields, error bodies.

use axum::body::Body;
use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::Span;
use uuid::Uuid;

use crate::error::ErrorMessage;

/// Generates time-ordered UUIDv7 request ids.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// The `x-request-id` assigned to this request, or `"unknown"`.
pub fn request_id_str(id: Option<&RequestId>) -> String {
    id.and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Span for `TraceLayer` carrying the request id.
pub fn make_request_span(request: &axum::http::Request<Body>) -> Span {
    let request_id = request_id_str(request.extensions().get::<RequestId>());
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Rewrite error bodies produced by `ApiError` to include the request id.
pub async fn attach_request_id(request: Request, next: Next) -> Response {
    let request_id = request_id_str(request.extensions().get::<RequestId>());
    let mut response = next.run(request).await;

    if let Some(ErrorMessage(message)) = response.extensions_mut().remove::<ErrorMessage>() {
        let body = serde_json::json!({ "error": message, "request_id": request_id });
        response.headers_mut().remove(header::CONTENT_LENGTH);
        *response.body_mut() = Body::from(body.to_string());
    }
    response
}
