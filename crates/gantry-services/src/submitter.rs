//! Job submitter — turns a `JobRequest` into exactly one backend submission.
//!
//! No retry here. A rejected submission is dead-lettered with the backend's
//! reason; redelivery is the source's business.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use gantry_core::config::{BatchConfig, BucketConfig};
use gantry_core::{ComputeClass, DispatchError, EnvVar, EventSource, JobHandle, JobRequest};

use crate::backend::{
    BatchBackend, BatchSubmission, ContainerOverrides, JobTimeout, ResourceRequirement, ResourceType,
};
use crate::dead_letter::FailureRouter;
use crate::handlers::{env_value, upsert_env};

/// Result of a submission whose failure has already been handled.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Submitted(JobHandle),
    DeadLettered(DispatchError),
}

pub struct JobSubmitter {
    backend: Arc<dyn BatchBackend>,
    failures: FailureRouter,
    batch: BatchConfig,
    buckets: BucketConfig,
}

impl JobSubmitter {
    pub fn new(
        backend: Arc<dyn BatchBackend>,
        failures: FailureRouter,
        batch: BatchConfig,
        buckets: BucketConfig,
    ) -> Self {
        Self {
            backend,
            failures,
            batch,
            buckets,
        }
    }

    /// Queue and job definition for `req`. A handler-chosen definition wins.
    pub fn target<'a>(&'a self, req: &'a JobRequest) -> (&'a str, &'a str) {
        let (queue, definition) = match req.compute_class {
            ComputeClass::Gpu => (&self.batch.gpu_job_queue, &self.batch.gpu_job_definition),
            ComputeClass::Cpu => (&self.batch.cpu_job_queue, &self.batch.cpu_job_definition),
        };
        (queue, req.job_definition.as_deref().unwrap_or(definition))
    }

    /// Container environment: the base set, handler variables (replacing base
    /// names in place), then `JOB_ARGS`. Empty values are dropped.
    pub fn build_environment(&self, req: &JobRequest, now: DateTime<Utc>) -> Vec<EnvVar> {
        let meta = |key: &str, default: &str| {
            metadata_string(&req.metadata, key).unwrap_or_else(|| default.to_string())
        };

        let mut env = vec![
            EnvVar::new("INPUT_BUCKET", &self.buckets.input_bucket),
            EnvVar::new("INPUT_KEY", &req.script_key),
            EnvVar::new("OUTPUT_BUCKET", &self.buckets.output_bucket),
            EnvVar::new("OUTPUT_PREFIX", output_prefix(&req.job_name, now)),
            EnvVar::new("TIMESTAMP", now.to_rfc3339()),
            EnvVar::new("TRIGGER_USER", meta("user", "unknown")),
            EnvVar::new("TRIGGER_PROJECT", meta("project", "unknown")),
            EnvVar::new("TRIGGER_EXPERIMENT", meta("experiment", "")),
            EnvVar::new("COMPUTE_TYPE", req.compute_class.as_str()),
        ];
        for var in &req.environment {
            upsert_env(&mut env, var.clone());
        }
        if !req.args.is_empty() {
            upsert_env(&mut env, EnvVar::new("JOB_ARGS", Value::Object(req.args.clone()).to_string()));
        }

        env.retain(|e| !e.value.is_empty());
        env
    }

    pub fn build_submission(&self, req: &JobRequest, now: DateTime<Utc>) -> BatchSubmission {
        let (queue, definition) = self.target(req);

        let mut resource_requirements = vec![
            requirement(ResourceType::Vcpu, req.vcpus),
            requirement(ResourceType::Memory, req.memory_mib),
        ];
        if req.compute_class == ComputeClass::Gpu {
            resource_requirements.push(requirement(ResourceType::Gpu, req.gpu_count));
        }

        BatchSubmission {
            job_name: req.job_name.clone(),
            job_queue: queue.to_string(),
            job_definition: definition.to_string(),
            container_overrides: ContainerOverrides {
                resource_requirements,
                environment: self.build_environment(req, now),
                command: req.command.clone(),
            },
            timeout: req.timeout_secs.map(|secs| JobTimeout {
                attempt_duration_seconds: secs,
            }),
        }
    }

    /// One backend call. Failure comes back as `BackendSubmission`.
    pub async fn submit(&self, req: &JobRequest) -> Result<JobHandle, DispatchError> {
        let submission = self.build_submission(req, Utc::now());

        match self.backend.submit_job(&submission).await {
            Ok(resp) => {
                tracing::info!(
                    job_id = %resp.job_id,
                    job_name = %submission.job_name,
                    queue = %submission.job_queue,
                    compute = %req.compute_class,
                    vcpus = req.vcpus,
                    memory_mib = req.memory_mib,
                    gpus = req.gpu_count,
                    "job submitted"
                );
                Ok(JobHandle {
                    job_id: resp.job_id,
                    job_name: submission.job_name,
                    job_queue: submission.job_queue,
                    job_definition: submission.job_definition,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, job_name = %submission.job_name, "job submission failed");
                Err(DispatchError::BackendSubmission(e.to_string()))
            }
        }
    }

    /// Submit, dead-lettering the original event on failure. Only a failed
    /// dead-letter write comes back as `Err`.
    pub async fn submit_or_dead_letter(
        &self,
        req: &JobRequest,
        raw: &[u8],
        received_at: DateTime<Utc>,
    ) -> Result<SubmitOutcome, DispatchError> {
        match self.submit(req).await {
            Ok(handle) => Ok(SubmitOutcome::Submitted(handle)),
            Err(e) => {
                self.failures
                    .route(EventSource::Trigger, raw, &e, received_at)
                    .await?;
                Ok(SubmitOutcome::DeadLettered(e))
            }
        }
    }
}

/// `results/<YYYY-mm-dd>/<job_name>/`
pub fn output_prefix(job_name: &str, now: DateTime<Utc>) -> String {
    format!("results/{}/{job_name}/", now.format("%Y-%m-%d"))
}

fn requirement(kind: ResourceType, value: u32) -> ResourceRequirement {
    ResourceRequirement {
        kind,
        value: value.to_string(),
    }
}

fn metadata_string(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata.get(key).and_then(env_value)
}
