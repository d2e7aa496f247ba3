use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{EventType, NewSubscription, NewWhaleEvent, WhaleEvent};
use crate::AppState;

/// POST /api/notifications/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    Json(body): Json<NewSubscription>,
) -> Result<Json<Value>, AppError> {
    let request = body.validate()?;
    let subscription = state.store.insert_subscription(&request).await?;

    tracing::info!(
        subscription_id = %subscription.id,
        min_usd_value = %subscription.min_usd_value,
        "Subscription created"
    );

    Ok(Json(json!({
        "success": true,
        "data": subscription,
        "message": "Subscription created successfully",
    })))
}

/// GET /api/notifications/subscribe
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let subscriptions = state.store.list_subscriptions().await?;
    Ok(Json(json!({ "success": true, "data": subscriptions })))
}

#[derive(Debug, Deserialize)]
pub struct SetActive {
    pub active: bool,
}

/// PATCH /api/notifications/subscribe/:id
pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActive>,
) -> Result<Json<Value>, AppError> {
    if !state.store.set_subscription_active(id, body.active).await? {
        return Err(AppError::NotFound(format!("subscription {id}")));
    }
    tracing::info!(subscription_id = %id, active = body.active, "Subscription updated");
    Ok(Json(json!({ "success": true, "id": id, "active": body.active })))
}

/// POST /api/notifications/test: push a synthetic event through delivery.
pub async fn send_test(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let event = sample_event();
    let report = state.dispatcher.dispatch_without_marking(&event).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Test notifications sent",
        "matched": report.matched,
        "delivered": report.delivered,
        "failed": report.failed,
    })))
}

/// A $500k USDT transfer on ethereum. Never persisted.
fn sample_event() -> WhaleEvent {
    let now = Utc::now();
    NewWhaleEvent {
        event_type: EventType::WhaleTransfer,
        blockchain: "ethereum".into(),
        transaction_hash: "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef".into(),
        block_number: 12_345_678,
        timestamp: now,
        from_address: Some("0xabcdef1234567890abcdef1234567890abcdef12".into()),
        to_address: Some("0x1234567890abcdef1234567890abcdef12345678".into()),
        token_symbol: Some("USDT".into()),
        token_address: Some("0xdac17f958d2ee523a2206206994597c13d831ec7".into()),
        amount_raw: Some("500000000000".into()),
        amount_decimal: Some(Decimal::from(500_000)),
        usd_value: Decimal::from(500_000),
        protocol: None,
        metadata: None,
    }
    .into_event(Uuid::new_v4(), now)
}
