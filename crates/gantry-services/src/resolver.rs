//! Resource resolver — caller overrides merged over per-class defaults.
//!
//! A present override wins, an absent one falls back to the class default.
//! CPU jobs always get zero GPUs. Results outside the configured limits are
//! rejected rather than submitted.

use serde_json::{Map, Value};

use gantry_core::config::ResourceConfig;
use gantry_core::{ComputeClass, DispatchError};

/// Overrides projected out of an untyped payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceOverrides {
    pub vcpus: Option<i64>,
    pub memory_mib: Option<i64>,
    pub gpu_count: Option<i64>,
}

impl ResourceOverrides {
    /// Read overrides from `map` under the given keys. Integers and integer
    /// strings are accepted; null counts as absent; anything else is invalid.
    /// CPU jobs never use the GPU key, so a bad value there is only logged.
    pub fn from_fields(
        map: &Map<String, Value>,
        class: ComputeClass,
        vcpus_key: &str,
        memory_key: &str,
        gpus_key: &str,
    ) -> Result<Self, DispatchError> {
        let gpu_count = match class {
            ComputeClass::Gpu => integer_field(map, gpus_key)?,
            ComputeClass::Cpu => integer_field(map, gpus_key).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "gpus requested for CPU compute, ignoring");
                None
            }),
        };
        Ok(Self {
            vcpus: integer_field(map, vcpus_key)?,
            memory_mib: integer_field(map, memory_key)?,
            gpu_count,
        })
    }
}

fn integer_field(map: &Map<String, Value>, key: &str) -> Result<Option<i64>, DispatchError> {
    let invalid = |v: &Value| DispatchError::InvalidResourceSpec(format!("{key} must be an integer, got {v}"));
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v @ Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid(v)),
        Some(v) => Err(invalid(v)),
    }
}

/// Final numbers for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedResources {
    pub vcpus: u32,
    pub memory_mib: u32,
    pub gpu_count: u32,
}

#[derive(Debug, Clone)]
pub struct ResourceResolver {
    config: ResourceConfig,
}

impl ResourceResolver {
    pub fn new(config: ResourceConfig) -> Self {
        Self { config }
    }

    pub fn resolve(
        &self,
        class: ComputeClass,
        overrides: &ResourceOverrides,
    ) -> Result<ResolvedResources, DispatchError> {
        let defaults = self.config.defaults_for(class);
        let limits = self.config.limits;

        let vcpus = overrides.vcpus.unwrap_or(i64::from(defaults.vcpus));
        if vcpus < 1 {
            return Err(invalid(format!("vcpus must be a positive integer, got {vcpus}")));
        }
        if vcpus > i64::from(limits.max_vcpus) {
            return Err(invalid(format!("vcpus {vcpus} exceeds limit {}", limits.max_vcpus)));
        }

        let memory = overrides.memory_mib.unwrap_or(i64::from(defaults.memory_mib));
        let min_memory = i64::from(limits.min_memory_mib.max(1));
        if memory < min_memory {
            return Err(invalid(format!("memory must be >= {min_memory} MiB, got {memory}")));
        }
        if memory > i64::from(limits.max_memory_mib) {
            return Err(invalid(format!(
                "memory {memory} MiB exceeds limit {}",
                limits.max_memory_mib
            )));
        }

        let gpus = match class {
            ComputeClass::Cpu => {
                if let Some(requested) = overrides.gpu_count.filter(|g| *g != 0) {
                    tracing::warn!(requested, "gpus requested for CPU compute, ignoring");
                }
                0
            }
            ComputeClass::Gpu => {
                let gpus = overrides.gpu_count.unwrap_or(i64::from(defaults.gpu_count));
                if gpus < 1 {
                    return Err(invalid(format!("gpus must be >= 1 for GPU compute, got {gpus}")));
                }
                if gpus > i64::from(limits.max_gpus) {
                    return Err(invalid(format!("gpus {gpus} exceeds limit {}", limits.max_gpus)));
                }
                gpus
            }
        };

        // Bounded by u32 limits above.
        Ok(ResolvedResources {
            vcpus: vcpus as u32,
            memory_mib: memory as u32,
            gpu_count: gpus as u32,
        })
    }
}

fn invalid(reason: String) -> DispatchError {
    DispatchError::InvalidResourceSpec(reason)
}
