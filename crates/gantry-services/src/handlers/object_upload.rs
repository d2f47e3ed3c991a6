//! `object_upload` — an uploaded script or notebook runs itself.
//!
//! Resources and extra variables ride along as object metadata:
//! `job-vcpus`, `job-memory`, `job-gpus`, `job-compute`, `job-timeout`,
//! `job-command` (whitespace-split into the container command), and any other
//! `job-*` key becomes a container variable (`job-foo-bar` → `JOB_FOO_BAR`).

use chrono::Utc;
use serde_json::{json, Map, Value};

use gantry_core::{ComputeClass, DispatchError, EnvVar, JobRequest, TriggerEvent};

use super::{env_value, generate_job_name, optional_object, required_str, timeout_field, upsert_env};
use crate::registry::{HandlerInfo, TriggerHandler};
use crate::resolver::{ResourceOverrides, ResourceResolver};

pub const OBJECT_UPLOAD: &str = "object_upload";

const META_PREFIX: &str = "job-";
const META_VCPUS: &str = "job-vcpus";
const META_MEMORY: &str = "job-memory";
const META_GPUS: &str = "job-gpus";
const META_COMPUTE: &str = "job-compute";
const META_TIMEOUT: &str = "job-timeout";
const META_COMMAND: &str = "job-command";
const RESERVED: [&str; 6] = [META_VCPUS, META_MEMORY, META_GPUS, META_COMPUTE, META_TIMEOUT, META_COMMAND];

pub struct ObjectUploadHandler {
    resolver: ResourceResolver,
    default_timeout_secs: u64,
    notebook_definition: Option<String>,
}

impl ObjectUploadHandler {
    /// An empty `notebook_definition` leaves notebooks on the class default.
    pub fn new(resolver: ResourceResolver, default_timeout_secs: u64, notebook_definition: &str) -> Self {
        Self {
            resolver,
            default_timeout_secs,
            notebook_definition: (!notebook_definition.is_empty()).then(|| notebook_definition.to_string()),
        }
    }
}

impl TriggerHandler for ObjectUploadHandler {
    fn trigger_type(&self) -> &'static str {
        OBJECT_UPLOAD
    }

    fn describe(&self) -> HandlerInfo {
        let mut optional = Map::new();
        optional.insert("size".into(), Value::Null);
        optional.insert("object_metadata".into(), json!({}));
        HandlerInfo {
            trigger_type: OBJECT_UPLOAD,
            required_fields: vec!["bucket", "key"],
            optional_fields: optional,
        }
    }

    fn produce(&self, event: &TriggerEvent) -> Result<Vec<JobRequest>, DispatchError> {
        let data = &event.data;
        let bucket = required_str(data, OBJECT_UPLOAD, "bucket")?;
        let key = required_str(data, OBJECT_UPLOAD, "key")?;

        let empty = Map::new();
        let meta = optional_object(data, OBJECT_UPLOAD, "object_metadata")?.unwrap_or(&empty);

        let compute_class = match meta.get(META_COMPUTE).and_then(env_value) {
            None => ComputeClass::default(),
            Some(s) => ComputeClass::parse(s.trim()).ok_or_else(|| {
                DispatchError::MalformedInput(format!(
                    "{OBJECT_UPLOAD}: {META_COMPUTE} must be 'gpu' or 'cpu', got: {s}"
                ))
            })?,
        };

        let overrides = ResourceOverrides::from_fields(meta, compute_class, META_VCPUS, META_MEMORY, META_GPUS)?;
        let resources = self.resolver.resolve(compute_class, &overrides)?;
        let timeout_secs = timeout_field(meta, OBJECT_UPLOAD, META_TIMEOUT, self.default_timeout_secs)?;

        // The object lives in the bucket that reported it, not the configured one.
        let mut environment = vec![EnvVar::new("INPUT_BUCKET", bucket)];
        for (name, value) in meta {
            if !name.starts_with(META_PREFIX) || RESERVED.contains(&name.as_str()) {
                continue;
            }
            if let Some(value) = env_value(value) {
                upsert_env(&mut environment, EnvVar::new(env_name(name), value));
            }
        }

        let job_definition = if key.ends_with(".ipynb") {
            self.notebook_definition.clone()
        } else {
            None
        };

        let command = meta
            .get(META_COMMAND)
            .and_then(env_value)
            .map(|c| c.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|argv| !argv.is_empty());

        let job_name = generate_job_name(key, Utc::now());
        tracing::info!(bucket, key, job_name = %job_name, compute = %compute_class, "object upload accepted");

        Ok(vec![JobRequest {
            compute_class,
            script_key: key.to_string(),
            job_name,
            vcpus: resources.vcpus,
            memory_mib: resources.memory_mib,
            gpu_count: resources.gpu_count,
            environment,
            metadata: event.metadata.clone(),
            args: Map::new(),
            timeout_secs,
            job_definition,
            command,
        }])
    }
}

/// `job-foo-bar` → `JOB_FOO_BAR`.
fn env_name(meta_key: &str) -> String {
    meta_key.to_ascii_uppercase().replace('-', "_")
}
