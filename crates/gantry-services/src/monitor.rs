//! Completion monitor — turns terminal job state changes into notifications
//! and job summaries.
//!
//! Only SUCCEEDED and FAILED do anything. Every other status returns before
//! any external call is made.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use gantry_core::{
    ContainerDetail, DispatchError, ErrorKind, EventSource, JobDetail, JobStateEvent, JobStatus,
    JobSummary, Notification, Severity,
};

use crate::backend::BatchBackend;
use crate::dead_letter::FailureRouter;
use crate::notifier::Notifier;
use crate::summary::SummarySink;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MonitorOutcome {
    /// Non-terminal status; nothing was called.
    Ignored { status: JobStatus },
    Notified { job_id: String, severity: Severity },
    DeadLettered { error_kind: ErrorKind, error_reason: String },
}

/// Accepts the event-bus envelope (`{"detail": {...}}`) or a bare detail object.
pub fn parse_job_state(raw: &[u8]) -> Result<JobStateEvent, DispatchError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| DispatchError::MalformedInput(format!("invalid JSON: {e}")))?;

    let detail = match value {
        Value::Object(mut obj) => match obj.remove("detail") {
            Some(detail @ Value::Object(_)) => detail,
            Some(_) => {
                return Err(DispatchError::MalformedInput(
                    "'detail' must be a JSON object".to_string(),
                ))
            }
            None => Value::Object(obj),
        },
        _ => {
            return Err(DispatchError::MalformedInput(
                "job state event must be a JSON object".to_string(),
            ))
        }
    };

    serde_json::from_value(detail)
        .map_err(|e| DispatchError::MalformedInput(format!("invalid job state event: {e}")))
}

pub struct CompletionMonitor {
    backend: Arc<dyn BatchBackend>,
    notifier: Arc<dyn Notifier>,
    failures: FailureRouter,
    /// `None` disables summary writes.
    summaries: Option<Arc<dyn SummarySink>>,
    describe_jobs: bool,
    output_bucket: String,
}

impl CompletionMonitor {
    pub fn new(
        backend: Arc<dyn BatchBackend>,
        notifier: Arc<dyn Notifier>,
        failures: FailureRouter,
        summaries: Option<Arc<dyn SummarySink>>,
        describe_jobs: bool,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            notifier,
            failures,
            summaries,
            describe_jobs,
            output_bucket: output_bucket.into(),
        }
    }

    /// Handle one job state change. Only a failed dead-letter write is an `Err`.
    pub async fn handle(&self, raw: &[u8]) -> Result<MonitorOutcome, DispatchError> {
        let received_at = Utc::now();

        let event = match parse_job_state(raw) {
            Ok(event) => event,
            Err(e) => {
                self.failures
                    .route(EventSource::JobState, raw, &e, received_at)
                    .await?;
                return Ok(dead_lettered(&e));
            }
        };

        if !event.status.is_terminal() {
            tracing::debug!(job_id = %event.job_id, status = event.status.as_str(), "non-terminal status, ignoring");
            return Ok(MonitorOutcome::Ignored {
                status: event.status,
            });
        }

        let detail = if self.describe_jobs {
            self.describe(&event.job_id).await
        } else {
            None
        };

        let notification = build_notification(&event, detail.as_ref(), &self.output_bucket);
        let severity = notification.severity;

        let published = self.notifier.publish(&notification).await;
        self.write_summary(&event, detail.as_ref(), received_at).await;

        if let Err(e) = published {
            let err = DispatchError::Publish(e.to_string());
            self.failures
                .dead_letter(EventSource::JobState, raw, &err, received_at)
                .await?;
            return Ok(dead_lettered(&err));
        }

        tracing::info!(
            job_id = %event.job_id,
            job_name = %event.job_name,
            status = event.status.as_str(),
            "completion notification sent"
        );
        Ok(MonitorOutcome::Notified {
            job_id: event.job_id,
            severity,
        })
    }

    /// Log-and-continue: a missing summary never fails the event.
    async fn write_summary(&self, event: &JobStateEvent, detail: Option<&JobDetail>, at: DateTime<Utc>) {
        let Some(sink) = &self.summaries else {
            return;
        };
        let summary = build_summary(event, detail, at);
        let key = summary.object_key();
        match sink.put(&self.output_bucket, &key, &summary).await {
            Ok(()) => tracing::debug!(job_id = %event.job_id, key, "job summary written"),
            Err(e) => tracing::warn!(job_id = %event.job_id, error = %e, "job summary not written"),
        }
    }

    /// Best effort. The event alone is enough to notify.
    async fn describe(&self, job_id: &str) -> Option<JobDetail> {
        match self.backend.describe_job(job_id).await {
            Ok(Some(detail)) => Some(detail),
            Ok(None) => {
                tracing::warn!(job_id, "job unknown to backend, notifying from event only");
                None
            }
            Err(e) => {
                tracing::warn!(job_id, error = %e, "describe job failed, notifying from event only");
                None
            }
        }
    }
}

fn dead_lettered(err: &DispatchError) -> MonitorOutcome {
    MonitorOutcome::DeadLettered {
        error_kind: err.kind(),
        error_reason: err.to_string(),
    }
}

pub fn build_summary(event: &JobStateEvent, detail: Option<&JobDetail>, at: DateTime<Utc>) -> JobSummary {
    let details = match detail {
        Some(d) => serde_json::to_value(d),
        None => serde_json::to_value(event),
    }
    .unwrap_or(Value::Null);
    JobSummary {
        job_name: event.job_name.clone(),
        job_id: event.job_id.clone(),
        status: event.status.as_str().to_string(),
        timestamp: at,
        details,
    }
}

// ── Notification body ─────────────────────────────────────────────────────────

/// Event fields win; the backend description fills the gaps.
pub fn build_notification(
    event: &JobStateEvent,
    detail: Option<&JobDetail>,
    output_bucket: &str,
) -> Notification {
    let empty = ContainerDetail::default();
    let from_event = event.container.as_ref().unwrap_or(&empty);
    let from_detail = detail.map(|d| &d.container).unwrap_or(&empty);

    let started = event.started_at.or(detail.and_then(|d| d.started_at));
    let stopped = event.stopped_at.or(detail.and_then(|d| d.stopped_at));
    let duration = match (started, stopped) {
        (Some(start), Some(stop)) if stop >= start => {
            format!("{:.2} seconds", (stop - start) as f64 / 1000.0)
        }
        _ => "unknown".to_string(),
    };

    let exit_code = from_event
        .exit_code
        .or(from_detail.exit_code)
        .map(|c| c.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let log_stream = from_event
        .log_stream_name
        .as_deref()
        .or(from_detail.log_stream_name.as_deref())
        .unwrap_or("unavailable");

    let environment = if from_detail.environment.is_empty() {
        &from_event.environment
    } else {
        &from_detail.environment
    };
    let output_prefix = environment
        .iter()
        .find(|e| e.name == "OUTPUT_PREFIX")
        .map(|e| e.value.clone())
        .unwrap_or_else(|| format!("results/{}/", event.job_name));

    let queue = if event.job_queue.is_empty() {
        "unknown"
    } else {
        event.job_queue.as_str()
    };

    let mut body = format!(
        "Job Name: {}\n\
         Job ID: {}\n\
         Job Queue: {queue}\n\
         Status: {}\n\
         Duration: {duration}\n\
         Exit Code: {exit_code}\n",
        event.job_name,
        event.job_id,
        event.status.as_str(),
    );

    if event.status == JobStatus::Failed {
        let reason = from_event
            .reason
            .as_deref()
            .or(from_detail.reason.as_deref())
            .unwrap_or("Unknown");
        let status_reason = event
            .status_reason
            .as_deref()
            .or(detail.and_then(|d| d.status_reason.as_deref()))
            .unwrap_or("No reason provided");
        body.push_str(&format!("Reason: {reason}\nStatus Reason: {status_reason}\n"));
    }

    body.push_str(&format!(
        "\nOutput Location: s3://{output_bucket}/{output_prefix}\n\nLogs: {log_stream}\n"
    ));

    match event.status {
        JobStatus::Failed => Notification::error(
            format!("ML Job Failed: {}", event.job_name),
            format!("ML Job Failed\n\n{body}\nCheck the logs for detailed error information.\n"),
        ),
        _ => Notification::info(
            format!("ML Job Succeeded: {}", event.job_name),
            format!("ML Job Completed Successfully\n\n{body}\nCheck the output bucket for results.\n"),
        ),
    }
}
