//! HTTP-level tests for `ProviderApi` against an in-process mock provider.
//!
//! Each test binds an axum router on an ephemeral port and points the
//! client at it, so the full request/response path (headers, bodies,
//! status codes) is exercised without any external service.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use scenegen_core::asset::{ArtifactRef, AssetKind};
use scenegen_providers::{
    Dialect, GenerationProvider, GenerationRequest, ProviderApi, ProviderError, ProviderStatus,
    Submission,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Recorded {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    fn record(&self, headers: &HeaderMap, body: Value) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.auth.lock().unwrap().push(auth);
        self.bodies.lock().unwrap().push(body);
    }
}

/// Serve `router` on 127.0.0.1 and return its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn task_router(recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/v1/tasks",
            post(
                |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    rec.record(&headers, body);
                    Json(json!({ "id": "task-1", "status": "PENDING" }))
                },
            ),
        )
        .route(
            "/v1/tasks/{id}",
            get(|Path(id): Path<String>| async move {
                match id.as_str() {
                    "task-1" => (
                        StatusCode::OK,
                        Json(json!({ "id": id, "status": "SUCCEEDED", "output": ["https://cdn/clip.mp4"] })),
                    ),
                    "busy" => (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": "slow down" }))),
                    _ => (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": "bad id" }))),
                }
            })
            .delete(|State(rec): State<Recorded>, Path(id): Path<String>| async move {
                rec.cancelled.lock().unwrap().push(id);
                StatusCode::NO_CONTENT
            }),
        )
        .with_state(recorded)
}

fn prediction_router(recorded: Recorded) -> Router {
    Router::new()
        .route(
            "/v1/predictions",
            post(
                |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    rec.record(&headers, body);
                    Json(json!({
                        "id": "pred-1",
                        "status": "succeeded",
                        "output": "data:image/png;base64,iVBORw0KGgo="
                    }))
                },
            ),
        )
        .route(
            "/v1/predictions/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({ "id": id, "status": "processing", "output": null }))
            }),
        )
        .route(
            "/v1/predictions/{id}/cancel",
            post(|State(rec): State<Recorded>, Path(id): Path<String>| async move {
                rec.cancelled.lock().unwrap().push(id);
                Json(json!({ "status": "canceled" }))
            }),
        )
        .with_state(recorded)
}

// ---------------------------------------------------------------------------
// Task dialect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn task_dialect_submit_poll_cancel() {
    let recorded = Recorded::default();
    let base = serve(task_router(recorded.clone())).await;
    let api = ProviderApi::new("reel", Dialect::Task, base, Some("sk-test".into()));

    let request = GenerationRequest::new(AssetKind::Clip, "waves at night")
        .with_reference("https://cdn/seed.png");
    let submission = api.submit(&request).await.unwrap();
    assert_eq!(
        submission,
        Submission::Accepted {
            task_handle: "task-1".into()
        }
    );

    let bodies = recorded.bodies.lock().unwrap().clone();
    assert_eq!(bodies[0]["prompt"], "waves at night");
    assert_eq!(bodies[0]["reference_url"], "https://cdn/seed.png");
    assert_eq!(recorded.auth.lock().unwrap()[0], "Bearer sk-test");

    let status = api.poll_status("task-1").await.unwrap();
    assert_eq!(
        status,
        ProviderStatus::Succeeded {
            artifact_url: "https://cdn/clip.mp4".into()
        }
    );

    api.cancel("task-1").await.unwrap();
    assert_eq!(recorded.cancelled.lock().unwrap().as_slice(), ["task-1"]);
}

#[tokio::test]
async fn task_dialect_http_errors_are_classified() {
    let base = serve(task_router(Recorded::default())).await;
    let api = ProviderApi::new("reel", Dialect::Task, base, None);

    let busy = api.poll_status("busy").await.unwrap_err();
    assert_matches!(busy, ProviderError::Api { status: 429, .. });
    assert!(busy.is_transient());

    let bad = api.poll_status("nope").await.unwrap_err();
    assert_matches!(bad, ProviderError::Api { status: 422, .. });
    assert!(!bad.is_transient());
}

// ---------------------------------------------------------------------------
// Prediction dialect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prediction_dialect_synchronous_artifact() {
    let recorded = Recorded::default();
    let base = serve(prediction_router(recorded.clone())).await;
    let api = ProviderApi::new("stills", Dialect::Prediction, base, None);

    let request = GenerationRequest::new(AssetKind::Image, "a red door")
        .with_option("width", json!(1024));
    let submission = api.submit(&request).await.unwrap();
    assert_eq!(
        submission,
        Submission::Completed {
            artifact: ArtifactRef::new("data:image/png;base64,iVBORw0KGgo=")
        }
    );

    let bodies = recorded.bodies.lock().unwrap().clone();
    assert_eq!(bodies[0]["input"]["prompt"], "a red door");
    assert_eq!(bodies[0]["input"]["width"], 1024);
    assert!(recorded.auth.lock().unwrap()[0].is_empty());

    assert_eq!(api.poll_status("pred-1").await.unwrap(), ProviderStatus::Pending);

    api.cancel("pred-1").await.unwrap();
    assert_eq!(recorded.cancelled.lock().unwrap().as_slice(), ["pred-1"]);
}

#[tokio::test]
async fn unreachable_provider_is_transient() {
    // Bind and immediately drop a listener to get a port nobody serves.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ProviderApi::new("gone", Dialect::Task, format!("http://{addr}"), None);
    let err = api.poll_status("t").await.unwrap_err();
    assert_matches!(err, ProviderError::Request(_));
    assert!(err.is_transient());
}
