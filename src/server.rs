//! HTTP control plane and WebSocket preview endpoint.
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | `/status` | GET | `{capturing, frame_rate, state, last_error}` |
//! | `/start` | POST | start streaming (idempotent) |
//! | `/stop` | POST | stop streaming (idempotent, waits for the worker) |
//! | `/set_frame_rate?rate=N` | POST | change the target rate, 1..=60 |
//! | `/ws` | GET | preview feed, one JPEG `data:` URI per message |

use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::preview::PreviewStreamer;
use crate::streaming::{CaptureController, ControlError, StartOutcome, Status, StopOutcome};

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<CaptureController>,
    pub preview: Arc<PreviewStreamer>,
    pub shutdown: CancellationToken,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionResponse {
    pub status: String,
    pub message: String,
}

impl ActionResponse {
    fn new(status: &str, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    rate: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/set_frame_rate", post(set_frame_rate))
        .route("/ws", get(preview))
        .with_state(state)
        .layer(setup_cors())
}

fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(state.controller.status())
}

async fn start(State(state): State<AppState>) -> (StatusCode, Json<ActionResponse>) {
    match state.controller.start().await {
        Ok(StartOutcome::Started) => (
            StatusCode::OK,
            ActionResponse::new("started", "Screen capture started"),
        ),
        Ok(StartOutcome::AlreadyRunning) => (
            StatusCode::OK,
            ActionResponse::new("already_running", "Screen capture already running"),
        ),
        Err(e) => {
            error!("Failed to start capture: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ActionResponse::new("error", e.to_string()),
            )
        }
    }
}

async fn stop(State(state): State<AppState>) -> (StatusCode, Json<ActionResponse>) {
    let response = match state.controller.stop().await {
        StopOutcome::Stopped => ActionResponse::new("stopped", "Screen capture stopped"),
        StopOutcome::NotRunning => {
            ActionResponse::new("not_running", "Screen capture is not running")
        }
        StopOutcome::TimedOut => ActionResponse::new(
            "stop_timed_out",
            "Screen capture is still shutting down",
        ),
    };
    (StatusCode::OK, response)
}

async fn set_frame_rate(
    State(state): State<AppState>,
    Query(query): Query<RateQuery>,
) -> (StatusCode, Json<ActionResponse>) {
    let response = match state.controller.set_frame_rate(query.rate) {
        Ok(rate) => ActionResponse::new("success", format!("Frame rate set to {}", rate)),
        Err(ControlError::InvalidRate(e)) => ActionResponse::new("error", e.to_string()),
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                ActionResponse::new("error", e.to_string()),
            )
        }
    };
    (StatusCode::OK, response)
}

async fn preview(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let streamer = state.preview.clone();
    let shutdown = state.shutdown.clone();
    ws.on_upgrade(move |socket| streamer.serve(socket, shutdown))
}
