//! Routes trigger events to the handler registered for their `trigger_type`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use gantry_core::config::GantryConfig;
use gantry_core::{DispatchError, JobRequest, TriggerEvent};

use crate::handlers::batch_job::BatchJobHandler;
use crate::handlers::object_upload::ObjectUploadHandler;
use crate::resolver::ResourceResolver;

/// Self-description of a handler, served by `GET /triggers`.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub trigger_type: &'static str,
    pub required_fields: Vec<&'static str>,
    /// Optional field → default (null when it depends on the compute class).
    pub optional_fields: Map<String, Value>,
}

/// Turns one trigger event into zero or more jobs.
///
/// Handlers validate `data` themselves and project out only the fields they
/// understand. Adding a trigger type means adding an implementation and
/// registering it; the parser, resolver and submitter stay untouched.
pub trait TriggerHandler: Send + Sync {
    /// Registry key.
    fn trigger_type(&self) -> &'static str;

    fn describe(&self) -> HandlerInfo;

    fn produce(&self, event: &TriggerEvent) -> Result<Vec<JobRequest>, DispatchError>;
}

/// Maps trigger types to handlers. Built once at startup.
#[derive(Default)]
pub struct TriggerRegistry {
    handlers: HashMap<&'static str, Arc<dyn TriggerHandler>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every handler shipped in this crate.
    pub fn with_builtin(config: &GantryConfig) -> Self {
        let resolver = ResourceResolver::new(config.resources.clone());
        let mut registry = Self::new();
        registry.register(Arc::new(BatchJobHandler::new(
            resolver.clone(),
            config.batch.default_timeout_secs,
        )));
        registry.register(Arc::new(ObjectUploadHandler::new(
            resolver,
            config.batch.default_timeout_secs,
            &config.batch.notebook_job_definition,
        )));
        registry
    }

    /// Register a handler. One handler per type: a second registration for
    /// the same type is refused and returns false.
    pub fn register(&mut self, handler: Arc<dyn TriggerHandler>) -> bool {
        let trigger_type = handler.trigger_type();
        if self.handlers.contains_key(trigger_type) {
            tracing::warn!(trigger_type, "handler already registered, ignoring");
            return false;
        }
        self.handlers.insert(trigger_type, handler);
        true
    }

    pub fn resolve(&self, trigger_type: &str) -> Result<Arc<dyn TriggerHandler>, DispatchError> {
        self.handlers
            .get(trigger_type)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownTriggerType {
                trigger_type: trigger_type.to_string(),
                available: self.available().join(", "),
            })
    }

    /// Registered trigger types, sorted.
    pub fn available(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn describe_all(&self) -> Vec<HandlerInfo> {
        self.available()
            .into_iter()
            .filter_map(|t| self.handlers.get(t))
            .map(|h| h.describe())
            .collect()
    }
}
