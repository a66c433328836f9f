//! Unit handlers

use crate::api::rest::state::AppState;
use crate::engine::UnitOutcome;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use scout_types::{UnitName, UnitRecord};
use serde::Serialize;

/// A provisioned unit and its latest outcome
#[derive(Debug, Serialize)]
pub struct UnitSummary {
    pub name: UnitName,
    #[serde(flatten)]
    pub record: UnitRecord,
    pub last_outcome: Option<UnitOutcome>,
}

/// Store entry that failed to decode
#[derive(Debug, Serialize)]
pub struct MalformedSummary {
    pub name: UnitName,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct UnitListResponse {
    pub units: Vec<UnitSummary>,
    pub malformed: Vec<MalformedSummary>,
}

/// List every unit in the store
pub async fn list_units(State(state): State<AppState>) -> ApiResult<Json<UnitListResponse>> {
    let table = state.store.load().await?;
    let report = state.engine.last_report().await;

    let units = table
        .records
        .into_iter()
        .map(|(name, record)| UnitSummary {
            last_outcome: report
                .as_ref()
                .and_then(|r| r.outcome(name.as_str()))
                .cloned(),
            name,
            record,
        })
        .collect();

    let malformed = table
        .malformed
        .into_iter()
        .map(|(name, entry)| MalformedSummary {
            name,
            error: entry.error,
        })
        .collect();

    Ok(Json(UnitListResponse { units, malformed }))
}

/// Get a single unit
pub async fn get_unit(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<UnitSummary>> {
    let name = UnitName::new(name);
    let record = state
        .store
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unit {} not found", name)))?;

    let last_outcome = state
        .engine
        .last_report()
        .await
        .and_then(|r| r.outcome(name.as_str()).cloned());

    Ok(Json(UnitSummary {
        name,
        record,
        last_outcome,
    }))
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub queued: bool,
}

/// Request an immediate iteration
pub async fn trigger_reconcile(
    State(state): State<AppState>,
) -> (StatusCode, Json<TriggerResponse>) {
    let queued = state.scheduler.trigger_reconcile();
    if queued {
        tracing::info!("Reconciliation requested via API");
    }
    (StatusCode::ACCEPTED, Json(TriggerResponse { queued }))
}
