//! Inbound trigger message.
//!
//! `data` and `metadata` stay untyped at this boundary. Each handler projects
//! out the fields it understands and passes the rest through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed, immutable form of an inbound trigger message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// Registry key selecting the handler, e.g. "batch_job".
    pub trigger_type: String,
    /// Handler-specific payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Free-form caller context (user, project, experiment, ...).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TriggerEvent {
    pub fn new(trigger_type: impl Into<String>) -> Self {
        Self {
            trigger_type: trigger_type.into(),
            data: Map::new(),
            metadata: Map::new(),
        }
    }

    /// String field from `data`, if present and a string.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Metadata field rendered as a string. Non-string scalars are stringified.
    pub fn metadata_string(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
