//! Liveness and readiness.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Atomic Notes API",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Pings the database when there is one.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let Some(db) = &state.db else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "memory" })),
        );
    };

    atomic_db::log_pool_metrics(db.pool());
    match sqlx::query("SELECT 1").execute(db.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        ),
        Err(e) => {
            warn!(subsystem = "api", error = %e, "Health check database ping failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "disconnected" })),
            )
        }
    }
}
