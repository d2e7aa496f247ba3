use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// POST /api/ingestion/start
pub async fn start(State(state): State<AppState>) -> Json<Value> {
    state.ingestion.start_all();
    let chains: Vec<&str> = state.ingestion.chains().collect();
    tracing::info!(chains = ?chains, "Ingestion started via control API");

    Json(json!({
        "success": true,
        "message": "Blockchain ingestion started for all configured chains",
        "chains": chains,
    }))
}

/// POST /api/ingestion/stop
pub async fn stop(State(state): State<AppState>) -> Json<Value> {
    state.ingestion.stop_all();
    tracing::warn!("Ingestion stopped via control API");

    Json(json!({
        "success": true,
        "message": "Blockchain ingestion stopped for all chains",
    }))
}

/// GET /api/ingestion/status
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "running": state.ingestion.is_running(),
        "chains": state.ingestion.status(),
    }))
}
