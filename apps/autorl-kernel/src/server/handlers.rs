// [[AUTORL]]/apps/autorl-kernel/src/server/handlers.rs
// Purpose: API Handlers. Demo launch, run inspection, fleet/metrics, live stream.
// Architecture: API Layer
// Dependencies: Axum, Runtime

use axum::body::Bytes;
use axum::extract::ws::Message;
use axum::{
    extract::{ws::{WebSocket, WebSocketUpgrade}, Json, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::error::KernelError;
use crate::events::RuntimeEvent;
use crate::models::*;
use crate::observability::Metrics;
use crate::runtime::AutoRLRuntime;
use crate::security::ClientSession;

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 500;

#[derive(serde::Deserialize)]
pub struct RunQuery {
    run_id: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct ActivityQuery {
    limit: Option<usize>,
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    status: String,
    message: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "AutoRL Kernel Server is running".to_string(),
    })
}

pub async fn start_primary(
    State(runtime): State<Arc<AutoRLRuntime>>,
    ClientSession(client_id): ClientSession,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, KernelError> {
    let faults = parse_faults(&headers, &body)?;
    start(&runtime, SequenceVariant::Primary, faults, &client_id)
}

pub async fn start_cross_app(
    State(runtime): State<Arc<AutoRLRuntime>>,
    ClientSession(client_id): ClientSession,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, KernelError> {
    let faults = parse_faults(&headers, &body)?;
    start(&runtime, SequenceVariant::CrossApp, faults, &client_id)
}

/// An empty body means no faults. Anything else must be a JSON `FaultFlags`.
fn parse_faults(headers: &HeaderMap, body: &[u8]) -> Result<FaultFlags, KernelError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FaultFlags::default());
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let is_json = content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"));
    if !is_json {
        return Err(KernelError::UnsupportedMediaType(content_type.to_string()));
    }

    serde_json::from_slice(body).map_err(|e| KernelError::InvalidBody(e.to_string()))
}

fn start(
    runtime: &Arc<AutoRLRuntime>,
    variant: SequenceVariant,
    faults: FaultFlags,
    client_id: &str,
) -> Result<Json<serde_json::Value>, KernelError> {
    let run_id = runtime.start_sequence(variant, faults, client_id)?;

    Ok(Json(json!({
        "success": true,
        "run_id": run_id
    })))
}

pub async fn runtime_status(State(runtime): State<Arc<AutoRLRuntime>>) -> Json<serde_json::Value> {
    Json(json!({
        "running": runtime.is_running(),
        "active_run": runtime.active_run(),
        "screen": runtime.current_screen(),
    }))
}

pub async fn get_runtime_state(
    State(runtime): State<Arc<AutoRLRuntime>>,
    Query(query): Query<RunQuery>,
) -> Result<Json<RunRecord>, KernelError> {
    let run_id = query.run_id.ok_or(KernelError::MissingRunId)?;

    runtime
        .get_run(&run_id)
        .map(Json)
        .ok_or(KernelError::RunNotFound(run_id))
}

pub async fn list_devices(State(runtime): State<Arc<AutoRLRuntime>>) -> Json<Vec<DeviceInfo>> {
    Json(runtime.fleet.list())
}

pub async fn get_metrics(State(runtime): State<Arc<AutoRLRuntime>>) -> Json<Metrics> {
    Json(runtime.metrics())
}

pub async fn get_activity(
    State(runtime): State<Arc<AutoRLRuntime>>,
    Query(query): Query<ActivityQuery>,
) -> Json<Vec<RuntimeEvent>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .min(MAX_ACTIVITY_LIMIT);
    Json(runtime.recent_activity(limit))
}

pub async fn ws_event_stream(
    State(runtime): State<Arc<AutoRLRuntime>>,
    Query(query): Query<RunQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_event_stream(socket, runtime, query.run_id))
}

async fn handle_event_stream(
    socket: WebSocket,
    runtime: Arc<AutoRLRuntime>,
    run_filter: Option<String>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing emitted after it is missed
    let mut events = runtime.subscribe_events();
    let mut gestures = runtime.subscribe_gestures();

    let snapshot = json!({
        "type": "snapshot",
        "running": runtime.is_running(),
        "active_run": runtime.active_run(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if sender.send(Message::Text(snapshot.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {
                        tracing::info!("Client disconnected from event stream");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }

            received = events.recv() => {
                match received {
                    Ok(event) => {
                        if run_filter.as_ref().is_some_and(|id| *id != event.run_id) {
                            continue;
                        }
                        let frame = match event_frame(&event) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::error!("Failed to encode event {}: {}", event.id, e);
                                continue;
                            }
                        };
                        if sender.send(Message::Text(frame)).await.is_err() {
                            tracing::info!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Event stream lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            received = gestures.recv() => {
                match received {
                    Ok(tagged) => {
                        if run_filter.as_ref().is_some_and(|id| *id != tagged.run_id) {
                            continue;
                        }
                        let frame = gesture_frame(&tagged);
                        if sender.send(Message::Text(frame.to_string())).await.is_err() {
                            tracing::info!("Failed to send gesture, client disconnected");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Gesture stream lagged, skipped {} gestures", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}

fn event_frame(event: &RuntimeEvent) -> Result<String, KernelError> {
    let mut value = serde_json::to_value(event)?;
    value["type"] = json!("event");
    Ok(value.to_string())
}

fn gesture_frame(tagged: &RunGesture) -> serde_json::Value {
    json!({
        "type": "gesture",
        "run_id": tagged.run_id,
        "gesture": tagged.gesture,
    })
}
