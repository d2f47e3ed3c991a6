//! Built-in trigger handlers and the helpers they share.

pub mod batch_job;
pub mod object_upload;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use gantry_core::{DispatchError, EnvVar};

/// Upper bound the batch scheduler puts on job names.
pub const MAX_JOB_NAME_LEN: usize = 128;

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
// "-" plus the rendered timestamp.
const TIMESTAMP_SUFFIX_LEN: usize = 16;

/// `<stem>-<YYYYmmdd-HHMMSS>` from the script's file name.
pub fn generate_job_name(script_key: &str, now: DateTime<Utc>) -> String {
    let file = script_key.rsplit('/').next().unwrap_or(script_key);
    let stem = match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    };
    let mut name = sanitize_job_name(stem, MAX_JOB_NAME_LEN - TIMESTAMP_SUFFIX_LEN);
    if name.is_empty() {
        name.push_str("job");
    }
    format!("{name}-{}", now.format(TIMESTAMP_FORMAT))
}

/// Replace everything but ASCII alphanumerics, `-` and `_` with `-`, then
/// cut to `max_len` characters.
pub fn sanitize_job_name(raw: &str, max_len: usize) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .take(max_len)
        .collect()
}

/// Required non-empty string field.
pub(crate) fn required_str<'a>(
    data: &'a Map<String, Value>,
    trigger_type: &str,
    key: &str,
) -> Result<&'a str, DispatchError> {
    match data.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(DispatchError::MalformedInput(
            format!("{trigger_type}: missing required field '{key}'"),
        )),
        Some(other) => Err(DispatchError::MalformedInput(format!(
            "{trigger_type}: '{key}' must be a string, got {other}"
        ))),
    }
}

/// Optional object field; null counts as absent.
pub(crate) fn optional_object<'a>(
    data: &'a Map<String, Value>,
    trigger_type: &str,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, DispatchError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(m)) => Ok(Some(m)),
        Some(_) => Err(DispatchError::MalformedInput(format!(
            "{trigger_type}: '{key}' must be an object"
        ))),
    }
}

/// Scalar rendered the way it lands in a container variable. Nested values
/// are kept as compact JSON.
pub(crate) fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Timeout in seconds. Absent or null falls back to `default`; 0 disables.
pub(crate) fn timeout_field(
    data: &Map<String, Value>,
    trigger_type: &str,
    key: &str,
    default: u64,
) -> Result<Option<u64>, DispatchError> {
    let secs = match data.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Number(n)) => n.as_u64().ok_or_else(|| bad_timeout(trigger_type, key))?,
        Some(Value::String(s)) => s.trim().parse().map_err(|_| bad_timeout(trigger_type, key))?,
        Some(_) => return Err(bad_timeout(trigger_type, key)),
    };
    Ok((secs > 0).then_some(secs))
}

fn bad_timeout(trigger_type: &str, key: &str) -> DispatchError {
    DispatchError::MalformedInput(format!(
        "{trigger_type}: '{key}' must be a non-negative integer number of seconds"
    ))
}

/// Append `var`, replacing an earlier variable of the same name in place.
pub fn upsert_env(env: &mut Vec<EnvVar>, var: EnvVar) {
    match env.iter_mut().find(|e| e.name == var.name) {
        Some(existing) => existing.value = var.value,
        None => env.push(var),
    }
}
