use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use autorl_kernel::{server, AutoRLRuntime, KernelConfig};

fn app(demo_speed: f64) -> Router {
    let config = KernelConfig {
        screens_path: "/nonexistent/device_screens.json".into(),
        demo_speed,
        ..KernelConfig::default()
    };
    server::router(Arc::new(AutoRLRuntime::new(config)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_for_run(app: &Router, run_id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = send(app, get(&format!("/runtime/state?run_id={}", run_id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] != "running" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("run {} never finished", run_id);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(0.0);
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn primary_run_completes_and_second_start_conflicts() {
    let app = app(0.02);

    let request = Request::post("/demo/primary")
        .header("X-AUTORL-CLIENT-ID", "dashboard-1")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, post_json("/demo/cross-app", "{}")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already running"));

    let (_, status_body) = send(&app, get("/runtime/status")).await;
    assert_eq!(status_body["running"], true);
    assert_eq!(status_body["active_run"], run_id.as_str());

    let run = wait_for_run(&app, &run_id).await;
    assert_eq!(run["status"], "completed");
    assert_eq!(run["client_id"], "dashboard-1");
    let kinds: Vec<&str> = run["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.first(), Some(&"perception"));
    assert_eq!(kinds[kinds.len() - 2..], ["completed", "memory_saved"]);

    let (_, metrics) = send(&app, get("/api/metrics")).await;
    assert_eq!(metrics["completedRuns"], 1);
    assert_eq!(metrics["successRate"], 100.0);
}

#[tokio::test]
async fn injected_error_ends_in_recovery() {
    let app = app(0.0);

    let (status, body) = send(&app, post_json("/demo/primary", r#"{"injectError": true}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let run = wait_for_run(&app, &run_id).await;
    assert_eq!(run["status"], "recovered");
    assert_eq!(run["faults"]["injectError"], true);
    let events = run["events"].as_array().unwrap();
    assert!(events.iter().all(|e| e["kind"] != "completed"));
    assert_eq!(events.last().unwrap()["kind"], "recovered");

    let (_, activity) = send(&app, get("/api/activity?limit=3")).await;
    let activity = activity.as_array().unwrap();
    assert_eq!(activity.len(), 3);
    assert_eq!(activity[2]["kind"], "recovered");
}

#[tokio::test]
async fn fault_body_without_json_content_type_is_rejected() {
    let app = app(0.0);
    let request = Request::post("/demo/primary")
        .header("content-type", "text/plain")
        .body(Body::from(r#"{"injectError": true}"#))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(body["error"].as_str().unwrap().contains("text/plain"));

    let (_, status_body) = send(&app, get("/runtime/status")).await;
    assert_eq!(status_body["running"], false);
    let (_, metrics) = send(&app, get("/api/metrics")).await;
    assert_eq!(metrics["completedRuns"], 0);
}

#[tokio::test]
async fn malformed_fault_flags_are_rejected() {
    let app = app(0.0);

    let (status, body) = send(&app, post_json("/demo/primary", r#"{"injectError": "yes"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

    let (status, _) = send(&app, post_json("/demo/cross-app", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status_body) = send(&app, get("/runtime/status")).await;
    assert_eq!(status_body["running"], false);
}

#[tokio::test]
async fn empty_body_starts_run_without_faults() {
    let app = app(0.0);
    let request = Request::post("/demo/primary")
        .header("content-type", "application/json")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let run = wait_for_run(&app, body["run_id"].as_str().unwrap()).await;
    assert_eq!(run["status"], "completed");
    assert_eq!(run["faults"]["injectError"], false);
    assert_eq!(run["faults"]["injectUpdate"], false);
}

#[tokio::test]
async fn invalid_client_id_is_rejected() {
    let app = app(0.0);
    let request = Request::post("/demo/primary")
        .header("X-AUTORL-CLIENT-ID", "../../etc")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status_body) = send(&app, get("/runtime/status")).await;
    assert_eq!(status_body["running"], false);
}

#[tokio::test]
async fn run_state_requires_known_run_id() {
    let app = app(0.0);

    let (status, _) = send(&app, get("/runtime/state")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/runtime/state?run_id=missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn devices_are_listed() {
    let app = app(0.0);
    let (status, body) = send(&app, get("/api/devices")).await;

    assert_eq!(status, StatusCode::OK);
    let devices = body.as_array().unwrap();
    assert_eq!(devices.len(), 3);
    assert!(devices
        .iter()
        .any(|d| d["id"] == "emulator-5554" && d["platform"] == "android" && d["status"] == "idle"));
}
