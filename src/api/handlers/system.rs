use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Map, Value};

use crate::AppState;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "ingesting": state.ingestion.is_running() })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "db": "disconnected" })),
            )
        }
    }
}

pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics_handle.render();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// GET /api/setup/status: which chain endpoints are configured and
/// whether the database answers.
pub async fn setup_status(State(state): State<AppState>) -> impl IntoResponse {
    let mut body = Map::new();
    for chain in &state.config.chains {
        body.insert(chain.name.clone(), Value::Bool(chain.is_enabled()));
    }

    let database = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Database check failed");
            false
        }
    };
    body.insert("database".into(), Value::Bool(database));
    body.insert("missing_endpoints".into(), json!(state.config.missing_endpoints()));

    Json(Value::Object(body))
}
