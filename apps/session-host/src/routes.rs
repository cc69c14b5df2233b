use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use serde::Serialize;
use session_dispatch::{ControllerSnapshot, metrics};

use crate::state::AppState;

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    uptime_secs: u64,
    session_id: String,
    released: bool,
}

#[derive(Serialize)]
struct ControllersResponse {
    session_id: String,
    pending: usize,
    controllers: Vec<ControllerSnapshot>,
}

async fn health() -> &'static str {
    "ok"
}

async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let session = state.session();
    Json(ReadyResponse {
        status: if session.is_released() { "released" } else { "ok" },
        uptime_secs: state.uptime_secs(),
        session_id: session.session_id().to_string(),
        released: session.is_released(),
    })
}

async fn controllers(State(state): State<AppState>) -> Json<ControllersResponse> {
    let session = state.session();
    Json(ControllersResponse {
        session_id: session.session_id().to_string(),
        pending: session.pending_connections(),
        controllers: session.connected_controllers(),
    })
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather(),
    )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/ready", get(ready))
        .route("/controllers", get(controllers))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}
