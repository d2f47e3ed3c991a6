//! Trigger dispatcher — one invocation, start to finish.
//!
//! bytes → deliveries → `TriggerEvent` → handler → `JobRequest`s → submissions.
//! Each delivery is handled on its own: a bad one is dead-lettered and the
//! rest still run. Only a failed dead-letter write aborts the invocation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use gantry_core::{DispatchError, ErrorKind, EventSource, JobHandle, TriggerEvent};

use crate::dedup::{DedupCache, DedupClaim};
use crate::dead_letter::FailureRouter;
use crate::parser::{parse_trigger, unwrap_deliveries, Delivery};
use crate::registry::TriggerRegistry;
use crate::submitter::{JobSubmitter, SubmitOutcome};

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventOutcome {
    Submitted {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        trigger_type: String,
        jobs: Vec<JobHandle>,
        /// Jobs from this event whose submission was dead-lettered.
        dead_lettered: usize,
    },
    Duplicate {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        trigger_type: String,
        key: String,
    },
    DeadLettered {
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        error_kind: ErrorKind,
        error_reason: String,
    },
}

/// Per-invocation summary returned to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub processed: usize,
    pub submitted: usize,
    pub dead_lettered: usize,
    pub duplicates: usize,
    pub outcomes: Vec<EventOutcome>,
}

impl DispatchReport {
    fn record(&mut self, outcome: EventOutcome) {
        self.processed += 1;
        match &outcome {
            EventOutcome::Submitted {
                jobs, dead_lettered, ..
            } => {
                self.submitted += jobs.len();
                self.dead_lettered += dead_lettered;
            }
            EventOutcome::Duplicate { .. } => self.duplicates += 1,
            EventOutcome::DeadLettered { .. } => self.dead_lettered += 1,
        }
        self.outcomes.push(outcome);
    }
}

pub struct Dispatcher {
    registry: TriggerRegistry,
    submitter: JobSubmitter,
    failures: FailureRouter,
    dedup: Option<DedupCache>,
}

impl Dispatcher {
    pub fn new(
        registry: TriggerRegistry,
        submitter: JobSubmitter,
        failures: FailureRouter,
        dedup: Option<DedupCache>,
    ) -> Self {
        Self {
            registry,
            submitter,
            failures,
            dedup,
        }
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, raw: &[u8]) -> Result<DispatchReport, DispatchError> {
        let received_at = Utc::now();
        if let Some(cache) = &self.dedup {
            cache.purge_expired();
        }

        let mut report = DispatchReport::default();
        for delivery in unwrap_deliveries(raw) {
            let outcome = self.dispatch_one(delivery, received_at).await?;
            report.record(outcome);
        }

        tracing::info!(
            processed = report.processed,
            submitted = report.submitted,
            dead_lettered = report.dead_lettered,
            duplicates = report.duplicates,
            "invocation complete"
        );
        Ok(report)
    }

    async fn dispatch_one(
        &self,
        delivery: Delivery,
        received_at: DateTime<Utc>,
    ) -> Result<EventOutcome, DispatchError> {
        let Delivery {
            message_id,
            payload,
            event,
        } = delivery;

        let event = match event.map(Ok).unwrap_or_else(|| parse_trigger(&payload)) {
            Ok(event) => event,
            Err(e) => return self.reject(message_id, &payload, e, received_at).await,
        };

        let mut claim = match &self.dedup {
            Some(cache) => {
                let key = DedupCache::key_for(&event);
                match cache.claim(&key) {
                    Some(claim) => Some(claim),
                    None => {
                        tracing::info!(trigger_type = %event.trigger_type, key = %key, "duplicate trigger skipped");
                        return Ok(EventOutcome::Duplicate {
                            message_id,
                            trigger_type: event.trigger_type,
                            key,
                        });
                    }
                }
            }
            None => None,
        };

        // The claim is released on drop unless a job reached the backend,
        // including when the host cancels this future mid-flight.
        let outcome = self
            .run_event(message_id, &event, &payload, received_at, claim.as_mut())
            .await;
        outcome
    }

    async fn run_event(
        &self,
        message_id: Option<String>,
        event: &TriggerEvent,
        payload: &[u8],
        received_at: DateTime<Utc>,
        mut claim: Option<&mut DedupClaim<'_>>,
    ) -> Result<EventOutcome, DispatchError> {
        let produced = self
            .registry
            .resolve(&event.trigger_type)
            .and_then(|handler| handler.produce(event));
        let requests = match produced {
            Ok(requests) => requests,
            Err(e) => return self.reject(message_id, payload, e, received_at).await,
        };

        let mut jobs = Vec::with_capacity(requests.len());
        let mut failures = Vec::new();
        for req in &requests {
            match self
                .submitter
                .submit_or_dead_letter(req, payload, received_at)
                .await?
            {
                SubmitOutcome::Submitted(handle) => {
                    if let Some(claim) = claim.as_mut() {
                        claim.keep();
                    }
                    jobs.push(handle);
                }
                SubmitOutcome::DeadLettered(e) => failures.push(e),
            }
        }

        if jobs.is_empty() {
            if let Some(first) = failures.first() {
                if failures.len() > 1 {
                    tracing::warn!(count = failures.len(), "every job from the event was dead-lettered");
                }
                return Ok(EventOutcome::DeadLettered {
                    message_id,
                    error_kind: first.kind(),
                    error_reason: first.to_string(),
                });
            }
            tracing::info!(trigger_type = %event.trigger_type, "handler produced no jobs");
        }

        Ok(EventOutcome::Submitted {
            message_id,
            trigger_type: event.trigger_type.clone(),
            jobs,
            dead_lettered: failures.len(),
        })
    }

    async fn reject(
        &self,
        message_id: Option<String>,
        payload: &[u8],
        err: DispatchError,
        received_at: DateTime<Utc>,
    ) -> Result<EventOutcome, DispatchError> {
        self.failures
            .route(EventSource::Trigger, payload, &err, received_at)
            .await?;
        Ok(EventOutcome::DeadLettered {
            message_id,
            error_kind: err.kind(),
            error_reason: err.to_string(),
        })
    }
}
