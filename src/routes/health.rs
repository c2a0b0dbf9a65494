use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::db::HealthStatus;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadinessResponse {
    status: &'static str,
    timestamp: String,
    uptime: u64,
    started_at: String,
    database: HealthStatus,
}

async fn root(State(state): State<AppState>) -> Response {
    let db = state.db().health().await;
    let response = HealthResponse {
        status: if db.healthy { "ok" } else { "degraded" },
        database: if db.healthy { "connected" } else { "disconnected" },
        timestamp: now_iso(),
    };
    (status_code(db.healthy), Json(response)).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    Json(LivenessResponse {
        status: "healthy",
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
    .into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let db = state.db().health().await;
    let healthy = db.healthy;
    let response = ReadinessResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: now_iso(),
        uptime: state.uptime_seconds(),
        started_at: DateTime::<Utc>::from(state.started_at_system())
            .to_rfc3339_opts(SecondsFormat::Millis, true),
        database: db,
    };
    (status_code(healthy), Json(response)).into_response()
}

fn status_code(healthy: bool) -> StatusCode {
    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
