//! Job state change events from the batch backend.
//!
//! Field names follow the backend's camelCase schema. Only SUCCEEDED and
//! FAILED are terminal; anything else is ignored by the monitor.

use serde::{Deserialize, Serialize};

use crate::job::EnvVar;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
    /// A status this build does not know about. Treated as non-terminal.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::Pending => "PENDING",
            Self::Runnable => "RUNNABLE",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// Container section of a job state event or job description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerDetail {
    pub exit_code: Option<i64>,
    pub reason: Option<String>,
    pub log_stream_name: Option<String>,
    pub environment: Vec<EnvVar>,
}

/// One-shot notification that a job changed state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStateEvent {
    pub job_id: String,
    pub job_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Queue ARN or name.
    #[serde(default)]
    pub job_queue: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub stopped_at: Option<i64>,
    #[serde(default)]
    pub container: Option<ContainerDetail>,
}

/// Answer to "describe job".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub job_id: String,
    pub job_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub stopped_at: Option<i64>,
    #[serde(default)]
    pub container: ContainerDetail,
}

impl JobDetail {
    /// Value of a container environment variable, if the job set it.
    pub fn env(&self, name: &str) -> Option<&str> {
        self.container
            .environment
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }
}
