//! Normalized job description produced by trigger handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution profile. Each class has its own queue, job definition, and
/// resource defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeClass {
    #[default]
    Gpu,
    Cpu,
}

impl ComputeClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gpu" => Some(Self::Gpu),
            "cpu" => Some(Self::Cpu),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpu => "gpu",
            Self::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for ComputeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ready-to-submit job.
///
/// Invariants after resolution: `vcpus` and `memory_mib` are positive,
/// `gpu_count` is 0 exactly when `compute_class` is CPU, `script_key` is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub compute_class: ComputeClass,
    /// Object key of the executable payload.
    pub script_key: String,
    pub job_name: String,
    pub vcpus: u32,
    pub memory_mib: u32,
    pub gpu_count: u32,
    /// Handler-supplied variables, appended after the submitter's base set.
    pub environment: Vec<EnvVar>,
    /// Caller metadata passthrough.
    pub metadata: Map<String, Value>,
    /// Opaque to the dispatcher; handed to the container as `JOB_ARGS`.
    pub args: Map<String, Value>,
    /// Attempt duration in seconds. `None` leaves the definition's timeout.
    pub timeout_secs: Option<u64>,
    /// Handler-selected job definition, overriding the class default.
    pub job_definition: Option<String>,
    /// Replaces the definition's container command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

/// What the batch backend hands back for an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub job_name: String,
    pub job_queue: String,
    pub job_definition: String,
}
