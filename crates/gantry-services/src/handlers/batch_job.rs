//! `batch_job` — run a Python script from the input bucket on the batch
//! scheduler, GPU by default.

use chrono::Utc;
use serde_json::{json, Map, Value};

use gantry_core::{ComputeClass, DispatchError, EnvVar, JobRequest, TriggerEvent};

use super::{
    env_value, generate_job_name, optional_object, required_str, sanitize_job_name,
    timeout_field, upsert_env, MAX_JOB_NAME_LEN,
};
use crate::registry::{HandlerInfo, TriggerHandler};
use crate::resolver::{ResourceOverrides, ResourceResolver};

pub const BATCH_JOB: &str = "batch_job";

const KNOWN_FIELDS: &[&str] = &[
    "script_key",
    "compute_type",
    "vcpus",
    "memory",
    "gpus",
    "timeout",
    "additional_env",
    "job_name",
    "args",
];

pub struct BatchJobHandler {
    resolver: ResourceResolver,
    default_timeout_secs: u64,
}

impl BatchJobHandler {
    pub fn new(resolver: ResourceResolver, default_timeout_secs: u64) -> Self {
        Self {
            resolver,
            default_timeout_secs,
        }
    }
}

impl TriggerHandler for BatchJobHandler {
    fn trigger_type(&self) -> &'static str {
        BATCH_JOB
    }

    fn describe(&self) -> HandlerInfo {
        let mut optional = Map::new();
        optional.insert("compute_type".into(), json!("gpu"));
        optional.insert("vcpus".into(), Value::Null);
        optional.insert("memory".into(), Value::Null);
        optional.insert("gpus".into(), Value::Null);
        optional.insert("timeout".into(), json!(self.default_timeout_secs));
        optional.insert("additional_env".into(), json!({}));
        optional.insert("job_name".into(), Value::Null);
        optional.insert("args".into(), json!({}));
        HandlerInfo {
            trigger_type: BATCH_JOB,
            required_fields: vec!["script_key"],
            optional_fields: optional,
        }
    }

    fn produce(&self, event: &TriggerEvent) -> Result<Vec<JobRequest>, DispatchError> {
        let data = &event.data;

        let script_key = required_str(data, BATCH_JOB, "script_key")?;
        if !script_key.ends_with(".py") {
            return Err(DispatchError::MalformedInput(format!(
                "{BATCH_JOB}: script_key must be a .py file, got: {script_key}"
            )));
        }

        let compute_class = match data.get("compute_type") {
            None | Some(Value::Null) => ComputeClass::default(),
            Some(Value::String(s)) => ComputeClass::parse(s).ok_or_else(|| {
                DispatchError::MalformedInput(format!(
                    "{BATCH_JOB}: compute_type must be 'gpu' or 'cpu', got: {s}"
                ))
            })?,
            Some(other) => {
                return Err(DispatchError::MalformedInput(format!(
                    "{BATCH_JOB}: compute_type must be a string, got {other}"
                )))
            }
        };

        let overrides = ResourceOverrides::from_fields(data, compute_class, "vcpus", "memory", "gpus")?;
        let resources = self.resolver.resolve(compute_class, &overrides)?;
        let timeout_secs = timeout_field(data, BATCH_JOB, "timeout", self.default_timeout_secs)?;

        let mut environment = Vec::new();
        if let Some(extra) = optional_object(data, BATCH_JOB, "additional_env")? {
            for (name, value) in extra {
                if let Some(value) = env_value(value) {
                    upsert_env(&mut environment, EnvVar::new(name.clone(), value));
                }
            }
        }

        let job_name = match data.get("job_name") {
            Some(Value::String(s)) if !s.trim().is_empty() => sanitize_job_name(s.trim(), MAX_JOB_NAME_LEN),
            _ => generate_job_name(script_key, Utc::now()),
        };

        // Explicit args win over stray top-level fields.
        let mut args: Map<String, Value> = data
            .iter()
            .filter(|(k, _)| !KNOWN_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(explicit) = optional_object(data, BATCH_JOB, "args")? {
            args.extend(explicit.clone());
        }

        tracing::debug!(
            job_name = %job_name,
            compute = %compute_class,
            vcpus = resources.vcpus,
            memory_mib = resources.memory_mib,
            gpus = resources.gpu_count,
            "batch job resolved"
        );

        Ok(vec![JobRequest {
            compute_class,
            script_key: script_key.to_string(),
            job_name,
            vcpus: resources.vcpus,
            memory_mib: resources.memory_mib,
            gpu_count: resources.gpu_count,
            environment,
            metadata: event.metadata.clone(),
            args,
            timeout_secs,
            job_definition: None,
            command: None,
        }])
    }
}
