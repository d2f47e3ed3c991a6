//! Configuration system for Gantry.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $GANTRY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/gantry/config.toml
//!   3. ~/.config/gantry/config.toml
//!
//! The loaded config is immutable. It is built once at startup and handed to
//! every component constructor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::job::ComputeClass;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    pub batch: BatchConfig,
    pub buckets: BucketConfig,
    pub resources: ResourceConfig,
    pub notifications: NotificationConfig,
    pub dead_letter: DeadLetterConfig,
    pub dedup: DedupConfig,
    pub monitor: MonitorConfig,
    pub backend: BackendConfig,
    pub server: ServerConfig,
}

/// Queue and job definition per compute class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub gpu_job_queue: String,
    pub gpu_job_definition: String,
    pub cpu_job_queue: String,
    pub cpu_job_definition: String,
    /// Definition for `.ipynb` uploads. Empty = use the class definition.
    pub notebook_job_definition: String,
    /// Attempt duration applied when a trigger does not set one. 0 = none.
    pub default_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub input_bucket: String,
    pub output_bucket: String,
}

/// One record per compute class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefaults {
    pub vcpus: u32,
    pub memory_mib: u32,
    pub gpu_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub max_vcpus: u32,
    pub min_memory_mib: u32,
    pub max_memory_mib: u32,
    pub max_gpus: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub gpu: ResourceDefaults,
    pub cpu: ResourceDefaults,
    pub limits: ResourceLimits,
}

impl ResourceConfig {
    pub fn defaults_for(&self, class: ComputeClass) -> ResourceDefaults {
        match class {
            ComputeClass::Gpu => self.gpu,
            ComputeClass::Cpu => self.cpu,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Publish error notifications for dispatch failures.
    /// The completion monitor always publishes.
    pub enabled: bool,
    /// Pub/sub topic identifier.
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Durable queue identifier.
    pub queue: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Skip trigger events whose content was already submitted.
    pub enabled: bool,
    /// How long an accepted key suppresses duplicates.
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Call "describe job" to enrich terminal notifications.
    pub describe_jobs: bool,
    /// Write a JSON summary of every finished job to the output bucket.
    pub write_summaries: bool,
}

/// How external collaborators are reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Record submissions, notifications, and dead letters in process.
    #[default]
    Memory,
    /// Call HTTP gateways for batch, pub/sub, the dead-letter queue, and the
    /// object store.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Base URL of the batch gateway (`POST /jobs`, `GET /jobs/{id}`).
    pub batch_url: String,
    /// Base URL of the pub/sub gateway (`POST /topics/{topic}/messages`).
    pub publish_url: String,
    /// Base URL of the queue gateway (`POST /queues/{queue}/messages`).
    pub dead_letter_url: String,
    /// Base URL of the object store gateway (`PUT /buckets/{bucket}/objects/{key}`).
    pub object_store_url: String,
    /// Per-request timeout for gateway calls.
    pub request_timeout_secs: u64,
    /// Entries each in-memory store keeps before evicting the oldest.
    pub memory_retention: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP port for the invocation API. 0 = OS-assigned.
    pub port: u16,
    /// Wall-clock budget per invocation.
    pub invocation_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for GantryConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            buckets: BucketConfig::default(),
            resources: ResourceConfig::default(),
            notifications: NotificationConfig::default(),
            dead_letter: DeadLetterConfig::default(),
            dedup: DedupConfig::default(),
            monitor: MonitorConfig::default(),
            backend: BackendConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            gpu_job_queue: "ml-gpu-job-queue".to_string(),
            gpu_job_definition: "ml-python-job".to_string(),
            cpu_job_queue: "ml-cpu-job-queue".to_string(),
            cpu_job_definition: "ml-python-cpu-job".to_string(),
            notebook_job_definition: String::new(),
            default_timeout_secs: 3600,
        }
    }
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            input_bucket: "ml-input".to_string(),
            output_bucket: "ml-output".to_string(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            gpu: ResourceDefaults {
                vcpus: 4,
                memory_mib: 16384,
                gpu_count: 1,
            },
            cpu: ResourceDefaults {
                vcpus: 2,
                memory_mib: 4096,
                gpu_count: 0,
            },
            limits: ResourceLimits::default(),
        }
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_vcpus: 256,
            min_memory_mib: 256,
            max_memory_mib: 2_097_152, // 2 TiB
            max_gpus: 16,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            topic: "ml-job-notifications".to_string(),
        }
    }
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            queue: "ml-trigger-dlq".to_string(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_secs: 3600,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            describe_jobs: true,
            write_summaries: true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Memory,
            batch_url: "http://127.0.0.1:9101".to_string(),
            publish_url: "http://127.0.0.1:9102".to_string(),
            dead_letter_url: "http://127.0.0.1:9103".to_string(),
            object_store_url: "http://127.0.0.1:9104".to_string(),
            request_timeout_secs: 10,
            memory_retention: 10_000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 9100,
            invocation_timeout_secs: 30,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("gantry")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl GantryConfig {
    /// Load config: env vars → file → defaults. The result is validated.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            GantryConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("GANTRY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&GantryConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text)
                .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject configurations that would produce malformed jobs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (class, d) in [("gpu", self.resources.gpu), ("cpu", self.resources.cpu)] {
            if d.vcpus == 0 || d.memory_mib == 0 {
                return Err(ConfigError::Invalid(format!(
                    "resources.{class}: vcpus and memory_mib must be positive"
                )));
            }
        }
        if self.resources.gpu.gpu_count == 0 {
            return Err(ConfigError::Invalid(
                "resources.gpu.gpu_count must be at least 1".to_string(),
            ));
        }
        if self.batch.gpu_job_queue.is_empty() || self.batch.gpu_job_definition.is_empty() {
            return Err(ConfigError::Invalid(
                "batch.gpu_job_queue and batch.gpu_job_definition are required".to_string(),
            ));
        }
        if self.batch.cpu_job_queue.is_empty() || self.batch.cpu_job_definition.is_empty() {
            return Err(ConfigError::Invalid(
                "batch.cpu_job_queue and batch.cpu_job_definition are required".to_string(),
            ));
        }
        if self.server.invocation_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.invocation_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `GANTRY_<SECTION>__<KEY>` overrides. `lookup` is `std::env::var`
    /// in production. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let text = |key: &str, slot: &mut String| {
            if let Some(v) = lookup(key) {
                *slot = v;
            }
        };
        text("GANTRY_BATCH__GPU_JOB_QUEUE", &mut self.batch.gpu_job_queue);
        text("GANTRY_BATCH__GPU_JOB_DEFINITION", &mut self.batch.gpu_job_definition);
        text("GANTRY_BATCH__CPU_JOB_QUEUE", &mut self.batch.cpu_job_queue);
        text("GANTRY_BATCH__CPU_JOB_DEFINITION", &mut self.batch.cpu_job_definition);
        text("GANTRY_BATCH__NOTEBOOK_JOB_DEFINITION", &mut self.batch.notebook_job_definition);
        text("GANTRY_BUCKETS__INPUT_BUCKET", &mut self.buckets.input_bucket);
        text("GANTRY_BUCKETS__OUTPUT_BUCKET", &mut self.buckets.output_bucket);
        text("GANTRY_NOTIFICATIONS__TOPIC", &mut self.notifications.topic);
        text("GANTRY_DEAD_LETTER__QUEUE", &mut self.dead_letter.queue);
        text("GANTRY_BACKEND__BATCH_URL", &mut self.backend.batch_url);
        text("GANTRY_BACKEND__PUBLISH_URL", &mut self.backend.publish_url);
        text("GANTRY_BACKEND__DEAD_LETTER_URL", &mut self.backend.dead_letter_url);
        text("GANTRY_BACKEND__OBJECT_STORE_URL", &mut self.backend.object_store_url);

        let flag = |key: &str, slot: &mut bool| {
            if let Some(v) = lookup(key) {
                *slot = v == "true" || v == "1";
            }
        };
        flag("GANTRY_NOTIFICATIONS__ENABLED", &mut self.notifications.enabled);
        flag("GANTRY_DEDUP__ENABLED", &mut self.dedup.enabled);
        flag("GANTRY_MONITOR__DESCRIBE_JOBS", &mut self.monitor.describe_jobs);
        flag("GANTRY_MONITOR__WRITE_SUMMARIES", &mut self.monitor.write_summaries);

        let resources = &mut self.resources;
        for (key, slot) in [
            ("GANTRY_RESOURCES__GPU__VCPUS", &mut resources.gpu.vcpus),
            ("GANTRY_RESOURCES__GPU__MEMORY_MIB", &mut resources.gpu.memory_mib),
            ("GANTRY_RESOURCES__GPU__GPU_COUNT", &mut resources.gpu.gpu_count),
            ("GANTRY_RESOURCES__CPU__VCPUS", &mut resources.cpu.vcpus),
            ("GANTRY_RESOURCES__CPU__MEMORY_MIB", &mut resources.cpu.memory_mib),
            ("GANTRY_RESOURCES__LIMITS__MAX_VCPUS", &mut resources.limits.max_vcpus),
            ("GANTRY_RESOURCES__LIMITS__MIN_MEMORY_MIB", &mut resources.limits.min_memory_mib),
            ("GANTRY_RESOURCES__LIMITS__MAX_MEMORY_MIB", &mut resources.limits.max_memory_mib),
            ("GANTRY_RESOURCES__LIMITS__MAX_GPUS", &mut resources.limits.max_gpus),
        ] {
            parse_into(&lookup, key, slot);
        }

        parse_into(&lookup, "GANTRY_BATCH__DEFAULT_TIMEOUT_SECS", &mut self.batch.default_timeout_secs);
        parse_into(&lookup, "GANTRY_DEDUP__WINDOW_SECS", &mut self.dedup.window_secs);
        parse_into(&lookup, "GANTRY_BACKEND__REQUEST_TIMEOUT_SECS", &mut self.backend.request_timeout_secs);
        parse_into(&lookup, "GANTRY_BACKEND__MEMORY_RETENTION", &mut self.backend.memory_retention);
        parse_into(&lookup, "GANTRY_SERVER__PORT", &mut self.server.port);
        parse_into(&lookup, "GANTRY_SERVER__INVOCATION_TIMEOUT_SECS", &mut self.server.invocation_timeout_secs);

        if let Some(v) = lookup("GANTRY_BACKEND__MODE") {
            match v.as_str() {
                "http" => self.backend.mode = BackendMode::Http,
                "memory" => self.backend.mode = BackendMode::Memory,
                _ => {}
            }
        }

        // CPU jobs never carry GPUs, whatever the source said.
        self.resources.cpu.gpu_count = 0;
    }
}

fn parse_into<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(v) = lookup(key).and_then(|v| v.trim().parse().ok()) {
        *slot = v;
    }
}
