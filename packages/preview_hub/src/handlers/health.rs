use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub sessions: usize,
    pub connections: usize,
    pub processes: usize,
    pub uptime_secs: u64,
}

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.registry.stats().await;

    Json(HealthStatus {
        status: "ok",
        sessions: stats.sessions,
        connections: stats.connections,
        processes: stats.processes,
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
