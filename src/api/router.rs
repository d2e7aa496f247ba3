use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;
use super::auth::require_auth;
use super::handlers;

pub fn create_router(state: AppState) -> Router {
    // Public routes, no authentication required
    let public = Router::new()
        .route("/health", get(handlers::system::health_check))
        .route("/metrics", get(handlers::system::render_metrics));

    // Protected API routes, require Bearer token when API_TOKEN is set
    let protected = Router::new()
        // Setup
        .route("/api/setup/status", get(handlers::system::setup_status))
        // Ingestion control
        .route("/api/ingestion/start", post(handlers::ingestion::start))
        .route("/api/ingestion/stop", post(handlers::ingestion::stop))
        .route("/api/ingestion/status", get(handlers::ingestion::status))
        // Notifications
        .route(
            "/api/notifications/subscribe",
            get(handlers::notifications::list).post(handlers::notifications::subscribe),
        )
        .route("/api/notifications/subscribe/:id", patch(handlers::notifications::set_active))
        .route("/api/notifications/test", post(handlers::notifications::send_test))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
