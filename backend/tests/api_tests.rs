//! HTTP surface tests
//!
//! Drives the router end to end against the in-memory gateway:
//! - Actor headers are required for writes
//! - Workflow errors map to status codes and bilingual bodies

mod common;

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use common::*;
use parts_fulfillment_backend::config::{
    Config, DatabaseConfig, ServerConfig, StorageBackend, WorkflowConfig,
};
use parts_fulfillment_backend::gateway::InMemoryGateway;
use parts_fulfillment_backend::services::{FixedClock, SequentialIds};
use parts_fulfillment_backend::{create_app, AppState};
use serde_json::{json, Value};
use shared::Transition;
use tower::ServiceExt;

fn app() -> Router {
    let config = Config {
        environment: "test".into(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        workflow: WorkflowConfig {
            max_bulk_size: 200,
            storage_backend: StorageBackend::Memory,
            atomic_batches: true,
        },
    };
    create_app(AppState {
        gateway: Arc::new(InMemoryGateway::new()),
        clock: Arc::new(FixedClock::new(start())),
        ids: Arc::new(SequentialIds::new()),
        config: Arc::new(config),
    })
}

fn post(uri: &str, body: Value, with_actor: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if with_actor {
        builder = builder
            .header("x-actor-uid", "u-ops")
            .header("x-actor-name", "Kim");
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test]
async fn test_create_requires_actor_headers() {
    let app = app();
    let body = serde_json::to_value(two_branch_part("API-1")).unwrap();

    let (status, body) = send(&app, post("/api/v1/requests", body, false)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_create_transition_and_history() {
    let app = app();
    let body = serde_json::to_value(two_branch_part("API-2")).unwrap();

    let (status, created) = send(&app, post("/api/v1/requests", body, true)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["stage"]["status"], "operations_submitted");
    let id = created["id"].as_str().unwrap().to_string();

    let transition = serde_json::to_value(Transition::new(order())).unwrap();
    let (status, ordered) = send(
        &app,
        post(&format!("/api/v1/requests/{}/transitions", id), transition, true),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ordered["stage"]["status"], "po_completed");

    let (status, history) = send(&app, get(&format!("/api/v1/requests/{}/history", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_wrong_source_status_is_a_conflict() {
    let app = app();
    let body = serde_json::to_value(two_branch_part("API-3")).unwrap();
    let (_, created) = send(&app, post("/api/v1/requests", body, true)).await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        post(
            &format!("/api/v1/requests/{}/transitions", id),
            serde_json::to_value(Transition::new(receipt(10))).unwrap(),
            true,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STATE_MISMATCH");
    assert_eq!(body["error"]["details"]["actual"], "operations_submitted");
    assert!(!body["error"]["message_ko"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_with_unknown_status_is_bad_request() {
    let app = app();
    let (status, body) = send(&app, get("/api/v1/requests?status=shipped")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Bulk and Sets
// ============================================================================

#[tokio::test]
async fn test_bulk_preview_of_nothing_is_rejected() {
    let app = app();
    let (status, body) = send(
        &app,
        post("/api/v1/bulk/preview", json!({ "requestIds": [] }), true),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["code"].is_string());
}

#[tokio::test]
async fn test_set_creation_and_progress() {
    let app = app();
    let parts: Vec<Value> = ["SET-A", "SET-B"]
        .iter()
        .map(|n| serde_json::to_value(two_branch_part(n)).unwrap())
        .collect();
    let body = json!({ "setName": "Wheel kit", "importance": "medium", "parts": parts });

    let (status, created) = send(&app, post("/api/v1/sets", body, true)).await;
    assert_eq!(status, StatusCode::CREATED);
    let set_id = created["set"]["setId"].as_str().unwrap().to_string();

    let (status, progress) = send(&app, get(&format!("/api/v1/sets/{}/progress", set_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["total"], 2);
    assert_eq!(progress["overallStatus"], "in_progress");
}

#[tokio::test]
async fn test_health_reports_storage() {
    let app = app();
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}
