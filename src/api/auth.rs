use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::errors::AppError;
use crate::AppState;

/// Bearer-token authentication middleware.
///
/// With `API_TOKEN` configured every request must carry
/// `Authorization: Bearer <token>`. Without it, authentication is disabled.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.config.api_token.as_deref() else {
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == expected => next.run(req).await,
        Some(_) => {
            tracing::debug!(path = %req.uri().path(), "Rejected request with invalid token");
            AppError::Unauthorized.into_response()
        }
        None => AppError::Unauthorized.into_response(),
    }
}
