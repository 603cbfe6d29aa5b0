// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API for the workflow dashboard.
//!
//! Lists the registered workflows with their live status, starts and stops
//! them, and streams [`HarvestEvent`]s over Server-Sent Events.

use crate::dashboard::{DashboardState, WorkflowError};
use crate::events::{self, HarvestEvent};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Build the axum Router with all dashboard endpoints.
pub fn router(state: Arc<DashboardState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/workflows", get(list_workflows))
        .route("/api/workflows/:key/start", post(start_workflow))
        .route("/api/workflows/:key/status", get(workflow_status))
        .route("/api/workflows/:key/stop", post(stop_workflow))
        .route("/api/events", get(events_sse))
        .layer(cors)
        .with_state(state)
}

/// Serve the dashboard on `0.0.0.0:{port}` until the process exits.
pub async fn start(port: u16, state: Arc<DashboardState>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("dashboard listening on http://localhost:{port}");
    serve_on(listener, state).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(listener: tokio::net::TcpListener, state: Arc<DashboardState>) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn workflow_error(err: WorkflowError) -> Response {
    match err {
        WorkflowError::Unknown(_) => error_response(StatusCode::NOT_FOUND, "unknown workflow"),
        WorkflowError::AlreadyRunning => error_response(StatusCode::CONFLICT, "already running"),
        e @ WorkflowError::Spawn { .. } => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────

/// Serve the embedded dashboard HTML.
async fn dashboard() -> impl IntoResponse {
    Html(include_str!("dashboard.html"))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Every workflow's registry entry merged with its current status.
async fn list_workflows(State(state): State<Arc<DashboardState>>) -> Json<Value> {
    let list: Vec<Value> = state
        .manager
        .workflows()
        .iter()
        .map(|wf| {
            let mut entry = serde_json::to_value(wf).unwrap_or_else(|_| json!({}));
            let status = serde_json::to_value(state.manager.status(wf.key)).unwrap_or_default();
            if let (Some(entry), Value::Object(status)) = (entry.as_object_mut(), status) {
                entry.extend(status);
            }
            entry
        })
        .collect();
    Json(Value::Array(list))
}

#[derive(Deserialize, Default)]
struct StartBody {
    #[serde(default)]
    env: HashMap<String, String>,
}

async fn start_workflow(
    Path(key): Path<String>,
    State(state): State<Arc<DashboardState>>,
    body: Option<Json<StartBody>>,
) -> Response {
    let env = body.map(|Json(b)| b.env).unwrap_or_default();
    match state.manager.start(&key, &env) {
        Ok(started) => Json(started).into_response(),
        Err(e) => workflow_error(e),
    }
}

async fn workflow_status(
    Path(key): Path<String>,
    State(state): State<Arc<DashboardState>>,
) -> Response {
    if state.manager.workflow(&key).is_none() {
        return error_response(StatusCode::NOT_FOUND, "unknown workflow");
    }
    Json(state.manager.status(&key)).into_response()
}

async fn stop_workflow(
    Path(key): Path<String>,
    State(state): State<Arc<DashboardState>>,
) -> Response {
    match state.manager.stop(&key).await {
        Ok(status) => Json(json!({ "status": status })).into_response(),
        Err(e) => workflow_error(e),
    }
}

/// SSE query parameters.
#[derive(Deserialize, Default)]
struct EventsParams {
    site: Option<String>,
}

/// Server-Sent Events endpoint for real-time event streaming.
///
/// Optionally filters by site or workflow key via `?site=cymax`.
async fn events_sse(
    Query(params): Query<EventsParams>,
    State(state): State<Arc<DashboardState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.events.subscribe();
    let filter = params.site;

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !events::event_matches(&event, filter.as_deref()) {
                        continue;
                    }
                    if let Ok(json) = serde_json::to_string::<HarvestEvent>(&event) {
                        yield Ok(Event::default().data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
