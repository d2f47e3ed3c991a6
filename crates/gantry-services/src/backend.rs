//! Batch backend — the external scheduler that runs submitted containers.
//!
//! Gantry only ever submits a job and describes a job. Scheduling, retries
//! and autoscaling belong to the backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use gantry_core::{ContainerDetail, EnvVar, JobDetail, JobStatus};

use crate::retained::{Retained, DEFAULT_RETENTION};

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceType {
    Vcpu,
    Memory,
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverrides {
    pub resource_requirements: Vec<ResourceRequirement>,
    pub environment: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTimeout {
    pub attempt_duration_seconds: u64,
}

/// One "submit job" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmission {
    pub job_name: String,
    pub job_queue: String,
    pub job_definition: String,
    pub container_overrides: ContainerOverrides,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<JobTimeout>,
}

impl BatchSubmission {
    /// Requested amount of a resource, if present.
    pub fn requirement(&self, kind: ResourceType) -> Option<u32> {
        self.container_overrides
            .resource_requirements
            .iter()
            .find(|r| r.kind == kind)
            .and_then(|r| r.value.parse().ok())
    }

    pub fn env(&self, name: &str) -> Option<&str> {
        self.container_overrides
            .environment
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: String,
    #[serde(default)]
    pub job_name: String,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait BatchBackend: Send + Sync {
    async fn submit_job(&self, submission: &BatchSubmission) -> Result<SubmitJobResponse, BackendError>;

    /// `Ok(None)` when the backend does not know the job.
    async fn describe_job(&self, job_id: &str) -> Result<Option<JobDetail>, BackendError>;
}

// ── HTTP gateway ──────────────────────────────────────────────────────────────

/// Talks to a batch gateway: `POST {base}/jobs`, `GET {base}/jobs/{id}`.
pub struct HttpBatchBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBatchBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BatchBackend for HttpBatchBackend {
    async fn submit_job(&self, submission: &BatchSubmission) -> Result<SubmitJobResponse, BackendError> {
        let resp = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .json(submission)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<SubmitJobResponse>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn describe_job(&self, job_id: &str) -> Result<Option<JobDetail>, BackendError> {
        let resp = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job_id))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        resp.json::<JobDetail>()
            .await
            .map(Some)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

// ── In-memory backend ─────────────────────────────────────────────────────────

/// Records submissions instead of running them. Used in local mode and tests.
/// Only the most recent `retention` jobs are kept.
#[derive(Clone)]
pub struct MemoryBatchBackend {
    /// job_id → current description
    jobs: Arc<DashMap<String, JobDetail>>,
    /// Accepted submissions, oldest first.
    submissions: Arc<Retained<(String, BatchSubmission)>>,
    /// When set, every submission is rejected with this message.
    reject_with: Arc<Mutex<Option<String>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for MemoryBatchBackend {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl MemoryBatchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            submissions: Arc::new(Retained::new(retention)),
            reject_with: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Reject all further submissions with `message`. `None` accepts again.
    pub fn set_rejection(&self, message: Option<&str>) {
        if let Ok(mut slot) = self.reject_with.lock() {
            *slot = message.map(str::to_string);
        }
    }

    pub fn submissions(&self) -> Vec<(String, BatchSubmission)> {
        self.submissions.snapshot()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    /// Move a recorded job to `status`, as the scheduler would.
    pub fn set_status(&self, job_id: &str, status: JobStatus, reason: Option<&str>) {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.status = status;
            job.status_reason = reason.map(str::to_string);
        }
    }
}

#[async_trait]
impl BatchBackend for MemoryBatchBackend {
    async fn submit_job(&self, submission: &BatchSubmission) -> Result<SubmitJobResponse, BackendError> {
        let rejection = self.reject_with.lock().ok().and_then(|r| r.clone());
        if let Some(message) = rejection {
            return Err(BackendError::Rejected {
                status: 400,
                message,
            });
        }

        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let job_id = format!("job-{n:08}");

        let evicted = self
            .submissions
            .push((job_id.clone(), submission.clone()))
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if let Some((old_id, _)) = evicted {
            self.jobs.remove(&old_id);
        }
        self.jobs.insert(
            job_id.clone(),
            JobDetail {
                job_id: job_id.clone(),
                job_name: submission.job_name.clone(),
                status: JobStatus::Submitted,
                status_reason: None,
                started_at: None,
                stopped_at: None,
                container: ContainerDetail {
                    environment: submission.container_overrides.environment.clone(),
                    ..ContainerDetail::default()
                },
            },
        );

        Ok(SubmitJobResponse {
            job_id,
            job_name: submission.job_name.clone(),
        })
    }

    async fn describe_job(&self, job_id: &str) -> Result<Option<JobDetail>, BackendError> {
        Ok(self.jobs.get(job_id).map(|j| j.clone()))
    }
}
