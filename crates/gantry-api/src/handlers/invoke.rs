//! POST /triggers and POST /job-events — one request is one invocation.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;

use gantry_services::{DispatchReport, MonitorOutcome};

use super::{within_budget, ApiState};

/// Raw body: a trigger message or a delivery batch. Bad events are
/// dead-lettered and still answer 200.
pub async fn handle_trigger(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<DispatchReport>, (StatusCode, String)> {
    state.counters.triggers.fetch_add(1, Ordering::Relaxed);
    let report = within_budget(&state, state.dispatcher.dispatch(&body)).await?;
    Ok(Json(report))
}

/// Raw body: a job state change, enveloped or bare.
pub async fn handle_job_event(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Json<MonitorOutcome>, (StatusCode, String)> {
    state.counters.job_events.fetch_add(1, Ordering::Relaxed);
    let outcome = within_budget(&state, state.monitor.handle(&body)).await?;
    Ok(Json(outcome))
}
