//! /status and /triggers handlers.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use gantry_core::config::BackendMode;
use gantry_services::HandlerInfo;

use super::ApiState;

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct StatusResponse {
    pub mode: BackendMode,
    pub uptime_secs: u64,
    pub trigger_types: Vec<&'static str>,
    pub invocations: InvocationInfo,
}

#[derive(Serialize)]
pub struct InvocationInfo {
    pub triggers: u64,
    pub job_events: u64,
    pub failed: u64,
    pub timed_out: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let c = &state.counters;
    Json(StatusResponse {
        mode: state.mode,
        uptime_secs: state.started_at.elapsed().as_secs(),
        trigger_types: state.dispatcher.registry().available(),
        invocations: InvocationInfo {
            triggers: c.triggers.load(Ordering::Relaxed),
            job_events: c.job_events.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            timed_out: c.timed_out.load(Ordering::Relaxed),
        },
    })
}

// ── /triggers ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct TriggersResponse {
    pub triggers: Vec<HandlerInfo>,
}

pub async fn handle_triggers(State(state): State<ApiState>) -> Json<TriggersResponse> {
    Json(TriggersResponse {
        triggers: state.dispatcher.registry().describe_all(),
    })
}
