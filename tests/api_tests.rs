mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use whale_tracker::api::create_router;
use whale_tracker::db::{EventStore, InMemoryEventStore};
use whale_tracker::ingestion::{ChainListener, IngestionManager, PollingListener};
use whale_tracker::models::{ChainFamily, NewSubscription};

use common::{listener_context, test_config, test_state, ScriptedSource};

fn build_test_app(extra_config: &[(&str, &str)]) -> (axum::Router, Arc<InMemoryEventStore>) {
    let store = Arc::new(InMemoryEventStore::new());
    let listener: Arc<dyn ChainListener> = Arc::new(PollingListener::new(
        "ethereum",
        ChainFamily::Evm,
        Duration::from_secs(60),
        ScriptedSource::default(),
        listener_context(store.clone(), None),
    ));
    let state = test_state(
        store.clone(),
        IngestionManager::new([listener]),
        test_config(extra_config),
    );
    (create_router(state), store)
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = build_test_app(&[]);

    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = build_test_app(&[]);

    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_subscribe_and_list() {
    let (app, store) = build_test_app(&[]);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/notifications/subscribe",
            json!({
                "webhook_url": "https://hooks.example.com/whales",
                "min_usd_value": 250000,
                "blockchains": ["Ethereum", "solana"],
                "event_types": []
            }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["blockchains"], json!(["ethereum", "solana"]));
    assert_eq!(json["data"]["event_types"], Value::Null);
    assert_eq!(json["data"]["active"], true);

    let resp = app.oneshot(get("/api/notifications/subscribe")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(store.list_active_subscriptions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_subscribe_defaults_min_usd_value() {
    let (app, store) = build_test_app(&[]);

    let resp = app
        .oneshot(post_json(
            "/api/notifications/subscribe",
            json!({ "email": "alerts@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let subs = store.list_subscriptions().await.unwrap();
    assert_eq!(subs[0].min_usd_value, rust_decimal::Decimal::from(100_000));
}

#[tokio::test]
async fn test_subscribe_rejects_invalid_bodies() {
    let (app, store) = build_test_app(&[]);

    let no_channel = app
        .clone()
        .oneshot(post_json("/api/notifications/subscribe", json!({ "min_usd_value": 1 })))
        .await
        .unwrap();
    assert_eq!(no_channel.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(no_channel).await["success"], false);

    let bad_type = app
        .oneshot(post_json(
            "/api/notifications/subscribe",
            json!({ "email": "a@example.com", "event_types": ["rug_pull"] }),
        ))
        .await
        .unwrap();
    assert_eq!(bad_type.status(), StatusCode::BAD_REQUEST);

    assert!(store.list_subscriptions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_toggle_subscription() {
    let (app, store) = build_test_app(&[]);
    let sub = common::add_subscription(
        &store,
        NewSubscription {
            email: Some("ops@example.com".into()),
            ..Default::default()
        },
    )
    .await;

    let req = Request::builder()
        .method("PATCH")
        .uri(format!("/api/notifications/subscribe/{}", sub.id))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "active": false }).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(store.list_active_subscriptions().await.unwrap().is_empty());

    let req = Request::builder()
        .method("PATCH")
        .uri(format!("/api/notifications/subscribe/{}", uuid::Uuid::new_v4()))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "active": true }).to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_notification_test_endpoint_does_not_persist() {
    let (app, store) = build_test_app(&[]);
    common::add_subscription(
        &store,
        NewSubscription {
            email: Some("ops@example.com".into()),
            ..Default::default()
        },
    )
    .await;

    let resp = app
        .oneshot(post_json("/api/notifications/test", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["matched"], 1);
    assert_eq!(json["delivered"], 1);
    assert_eq!(store.event_count(), 0);
}

#[tokio::test]
async fn test_ingestion_start_stop_status() {
    let (app, _) = build_test_app(&[]);

    let resp = app.clone().oneshot(get("/api/ingestion/status")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["running"], false);

    let resp = app
        .clone()
        .oneshot(post_json("/api/ingestion/start", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["chains"], json!(["ethereum"]));

    let resp = app.clone().oneshot(get("/api/ingestion/status")).await.unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["running"], true);
    let chains = json["chains"].as_array().unwrap();
    let eth = chains.iter().find(|c| c["chain"] == "ethereum").unwrap();
    assert_eq!(eth["running"], true);
    assert_eq!(eth["family"], "evm");
    let sol = chains.iter().find(|c| c["chain"] == "solana").unwrap();
    assert_eq!(sol["configured"], false);

    let resp = app
        .clone()
        .oneshot(post_json("/api/ingestion/stop", json!({})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/api/ingestion/status")).await.unwrap();
    assert_eq!(body_json(resp).await["running"], false);
}

#[tokio::test]
async fn test_setup_status_reports_endpoints() {
    let (app, _) = build_test_app(&[("ETHEREUM_RPC_URL", "https://eth.example")]);

    let resp = app.oneshot(get("/api/setup/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["ethereum"], true);
    assert_eq!(json["bsc"], false);
    assert_eq!(json["database"], true);
    assert!(json["missing_endpoints"]
        .as_array()
        .unwrap()
        .contains(&json!("SOLANA_RPC_URL")));
}

#[tokio::test]
async fn test_bearer_auth_when_token_configured() {
    let (app, _) = build_test_app(&[("API_TOKEN", "s3cret")]);

    let resp = app.clone().oneshot(get("/api/ingestion/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .uri("/api/ingestion/status")
        .header("authorization", "Bearer nope")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(wrong).await.unwrap().status(), StatusCode::UNAUTHORIZED);

    let right = Request::builder()
        .uri("/api/ingestion/status")
        .header("authorization", "Bearer s3cret")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(right).await.unwrap().status(), StatusCode::OK);

    // Health stays public
    assert_eq!(app.oneshot(get("/health")).await.unwrap().status(), StatusCode::OK);
}
