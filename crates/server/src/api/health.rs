//! Server health endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub chat_persistence: bool,
}

/// `GET /health` — liveness probe; reports whether chat persistence (the
/// PostgreSQL pool) came up, since the gateway degrades to a 503 on every
/// chat turn without it.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is up", body = HealthResponse)),
    tag = "Health"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: "0.1.0",
        chat_persistence: state.pg_pool.is_some(),
    })
}
