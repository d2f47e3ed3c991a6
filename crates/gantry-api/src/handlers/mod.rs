//! HTTP API handlers — invocation endpoints plus JSON views of dispatcher state.

pub mod inspect;
pub mod invoke;
pub mod status;

use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;

use gantry_core::config::BackendMode;
use gantry_core::DispatchError;
use gantry_services::{CompletionMonitor, Dispatcher, MemoryCollaborators};

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<CompletionMonitor>,
    /// Present in memory mode; backs the inspection endpoints.
    pub memory: Option<MemoryCollaborators>,
    pub mode: BackendMode,
    /// Wall-clock budget for one invocation.
    pub invocation_timeout: Duration,
    pub started_at: Instant,
    pub counters: Arc<InvocationCounters>,
}

/// Totals since startup, reported by `/status`.
#[derive(Default)]
pub struct InvocationCounters {
    pub triggers: AtomicU64,
    pub job_events: AtomicU64,
    pub failed: AtomicU64,
    pub timed_out: AtomicU64,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Run one invocation inside the budget. Timeout is 504, a fatal dispatch
/// error is 500; the source is expected to redeliver in both cases.
async fn within_budget<T>(
    state: &ApiState,
    fut: impl Future<Output = Result<T, DispatchError>>,
) -> Result<T, (StatusCode, String)> {
    use std::sync::atomic::Ordering;

    match tokio::time::timeout(state.invocation_timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            state.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, kind = %e.kind(), "invocation failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(_) => {
            state.counters.timed_out.fetch_add(1, Ordering::Relaxed);
            tracing::error!(budget_secs = state.invocation_timeout.as_secs(), "invocation timed out");
            Err((
                StatusCode::GATEWAY_TIMEOUT,
                format!(
                    "invocation exceeded {}s budget",
                    state.invocation_timeout.as_secs()
                ),
            ))
        }
    }
}

// Re-export handler functions for use in router setup.
pub use inspect::{
    handle_dead_letters, handle_notifications, handle_submissions, handle_summaries,
};
pub use invoke::{handle_job_event, handle_trigger};
pub use status::{handle_status, handle_triggers};
