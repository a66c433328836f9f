//! Health and status handlers

use crate::api::rest::state::AppState;
use crate::engine::IterationReport;
use axum::{extract::State, Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
    })
}

/// Agent status response
#[derive(Debug, Serialize)]
pub struct AgentStatusResponse {
    pub status: String,
    pub version: String,
    pub uptime: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub target_version: String,
    pub scheduler_running: bool,
    pub iterations: u64,
    pub proxy_dirty: bool,
    pub last_iteration: Option<IterationReport>,
}

/// Agent status endpoint
pub async fn agent_status(State(state): State<AppState>) -> Json<AgentStatusResponse> {
    let last_iteration = state.engine.last_report().await;
    let status = match &last_iteration {
        Some(report) if report.failed > 0 => "degraded",
        _ => "healthy",
    };

    Json(AgentStatusResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime: state.uptime(),
        started_at: state.started_at,
        target_version: state.engine.settings().target_version.clone(),
        scheduler_running: state.scheduler.is_running().await,
        iterations: state.engine.iterations(),
        proxy_dirty: state.engine.proxy_dirty(),
        last_iteration,
    })
}
