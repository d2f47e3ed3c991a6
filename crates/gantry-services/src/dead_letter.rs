//! Dead-letter queue and the failure router built on it.
//!
//! Every recoverable error ends here: the original event is wrapped in a
//! `DeadLetterEnvelope` and written to a durable queue. A failed write is the
//! one error that escapes an invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use gantry_core::{DeadLetterEnvelope, DispatchError, ErrorKind, EventSource, Notification};

use crate::notifier::Notifier;
use crate::retained::Retained;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("write to dead-letter queue '{queue}' failed: {message}")]
pub struct DeadLetterError {
    pub queue: String,
    pub message: String,
}

#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn write(&self, envelope: &DeadLetterEnvelope) -> Result<(), DeadLetterError>;
}

// ── HTTP gateway ──────────────────────────────────────────────────────────────

/// Appends via `POST {base}/queues/{queue}/messages`.
pub struct HttpDeadLetterQueue {
    client: reqwest::Client,
    base_url: String,
    queue: String,
}

impl HttpDeadLetterQueue {
    pub fn new(base_url: &str, queue: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            queue: queue.to_string(),
        })
    }
}

#[async_trait]
impl DeadLetterQueue for HttpDeadLetterQueue {
    async fn write(&self, envelope: &DeadLetterEnvelope) -> Result<(), DeadLetterError> {
        let fail = |message: String| DeadLetterError {
            queue: self.queue.clone(),
            message,
        };
        let resp = self
            .client
            .post(format!("{}/queues/{}/messages", self.base_url, self.queue))
            .json(envelope)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(fail(format!("{status}: {text}")));
        }
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Keeps the most recent `retention` entries in process.
#[derive(Clone, Default)]
pub struct MemoryDeadLetterQueue {
    entries: Arc<Retained<DeadLetterEnvelope>>,
    failing: Arc<AtomicBool>,
}

impl MemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            entries: Arc::new(Retained::new(retention)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn entries(&self) -> Vec<DeadLetterEnvelope> {
        self.entries.snapshot()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterQueue for MemoryDeadLetterQueue {
    async fn write(&self, envelope: &DeadLetterEnvelope) -> Result<(), DeadLetterError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(DeadLetterError {
                queue: "memory".to_string(),
                message: "queue unavailable".to_string(),
            });
        }
        let evicted = self.entries.push(envelope.clone()).map_err(|e| DeadLetterError {
            queue: "memory".to_string(),
            message: e.to_string(),
        })?;
        if let Some(old) = evicted {
            tracing::warn!(kind = %old.error_kind, "memory dead-letter queue full, oldest entry evicted");
        }
        Ok(())
    }
}

// ── Failure router ────────────────────────────────────────────────────────────

/// Writes dead letters and, when enabled, the matching error notification.
#[derive(Clone)]
pub struct FailureRouter {
    queue: Arc<dyn DeadLetterQueue>,
    notifier: Arc<dyn Notifier>,
    notify: bool,
}

impl FailureRouter {
    pub fn new(queue: Arc<dyn DeadLetterQueue>, notifier: Arc<dyn Notifier>, notify: bool) -> Self {
        Self {
            queue,
            notifier,
            notify,
        }
    }

    /// Dead-letter the event, then publish an error notification if enabled.
    /// A notification failure is logged and swallowed.
    pub async fn route(
        &self,
        source: EventSource,
        raw: &[u8],
        err: &DispatchError,
        received_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let envelope = self.dead_letter(source, raw, err, received_at).await?;

        if self.notify {
            let notification = failure_notification(&envelope);
            if let Err(e) = self.notifier.publish(&notification).await {
                tracing::warn!(error = %e, kind = %envelope.error_kind, "error notification not sent");
            }
        }
        Ok(())
    }

    /// Dead-letter the event without notifying.
    pub async fn dead_letter(
        &self,
        source: EventSource,
        raw: &[u8],
        err: &DispatchError,
        received_at: DateTime<Utc>,
    ) -> Result<DeadLetterEnvelope, DispatchError> {
        let envelope = DeadLetterEnvelope::new(source, raw, err.kind(), err.to_string(), received_at);

        match self.queue.write(&envelope).await {
            Ok(()) => {
                tracing::warn!(
                    source = ?source,
                    kind = %envelope.error_kind,
                    reason = %envelope.error_reason,
                    "event dead-lettered"
                );
                Ok(envelope)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    kind = %envelope.error_kind,
                    reason = %envelope.error_reason,
                    payload_digest = %payload_digest(raw),
                    "dead-letter write failed, event will be lost unless redelivered"
                );
                Err(DispatchError::DeadLetterWrite(e.to_string()))
            }
        }
    }
}

fn payload_digest(raw: &[u8]) -> String {
    hex::encode(&blake3::hash(raw).as_bytes()[..8])
}

fn failure_notification(envelope: &DeadLetterEnvelope) -> Notification {
    let subject = match (envelope.source, envelope.error_kind) {
        (EventSource::JobState, _) => "ML Job Monitor Error",
        (_, ErrorKind::BackendSubmissionFailure) => "ML Trigger Execution Error",
        _ => "ML Trigger Validation Error",
    };
    let header = match envelope.source {
        EventSource::JobState => "JOB MONITOR FAILED",
        EventSource::Trigger => "TRIGGER EXECUTION FAILED",
    };
    let body = format!(
        "{header}\n\n\
         Error Type: {}\n\
         Error: {}\n\n\
         Timestamp: {}",
        envelope.error_kind,
        envelope.error_reason,
        envelope.dead_lettered_at.to_rfc3339(),
    );
    Notification::error(subject, body)
}
