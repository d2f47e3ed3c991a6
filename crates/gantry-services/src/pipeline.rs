//! Wiring: config + collaborators → dispatcher and monitor.

use std::sync::Arc;
use std::time::Duration;

use gantry_core::config::{BackendMode, GantryConfig};

use crate::backend::{BatchBackend, HttpBatchBackend, MemoryBatchBackend};
use crate::dead_letter::{DeadLetterQueue, FailureRouter, HttpDeadLetterQueue, MemoryDeadLetterQueue};
use crate::dedup::DedupCache;
use crate::dispatcher::Dispatcher;
use crate::monitor::CompletionMonitor;
use crate::notifier::{HttpNotifier, MemoryNotifier, Notifier};
use crate::registry::TriggerRegistry;
use crate::submitter::JobSubmitter;
use crate::summary::{HttpSummarySink, MemorySummarySink, SummarySink};

/// In-process collaborators, kept around so their contents can be inspected.
#[derive(Clone, Default)]
pub struct MemoryCollaborators {
    pub batch: MemoryBatchBackend,
    pub notifier: MemoryNotifier,
    pub dead_letters: MemoryDeadLetterQueue,
    pub summaries: MemorySummarySink,
}

impl MemoryCollaborators {
    /// Each store keeps at most `retention` entries.
    pub fn with_retention(retention: usize) -> Self {
        Self {
            batch: MemoryBatchBackend::with_retention(retention),
            notifier: MemoryNotifier::with_retention(retention),
            dead_letters: MemoryDeadLetterQueue::with_retention(retention),
            summaries: MemorySummarySink::with_retention(retention),
        }
    }
}

pub struct Collaborators {
    pub batch: Arc<dyn BatchBackend>,
    pub notifier: Arc<dyn Notifier>,
    pub dead_letters: Arc<dyn DeadLetterQueue>,
    pub summaries: Arc<dyn SummarySink>,
    /// Set in memory mode.
    pub memory: Option<MemoryCollaborators>,
}

impl Collaborators {
    pub fn in_memory() -> Self {
        Self::from_memory(MemoryCollaborators::default())
    }

    pub fn from_memory(memory: MemoryCollaborators) -> Self {
        Self {
            batch: Arc::new(memory.batch.clone()),
            notifier: Arc::new(memory.notifier.clone()),
            dead_letters: Arc::new(memory.dead_letters.clone()),
            summaries: Arc::new(memory.summaries.clone()),
            memory: Some(memory),
        }
    }

    pub fn from_config(config: &GantryConfig) -> Result<Self, reqwest::Error> {
        match config.backend.mode {
            BackendMode::Memory => Ok(Self::from_memory(MemoryCollaborators::with_retention(
                config.backend.memory_retention,
            ))),
            BackendMode::Http => {
                let timeout = Duration::from_secs(config.backend.request_timeout_secs.max(1));
                Ok(Self {
                    batch: Arc::new(HttpBatchBackend::new(&config.backend.batch_url, timeout)?),
                    notifier: Arc::new(HttpNotifier::new(
                        &config.backend.publish_url,
                        &config.notifications.topic,
                        timeout,
                    )?),
                    dead_letters: Arc::new(HttpDeadLetterQueue::new(
                        &config.backend.dead_letter_url,
                        &config.dead_letter.queue,
                        timeout,
                    )?),
                    summaries: Arc::new(HttpSummarySink::new(&config.backend.object_store_url, timeout)?),
                    memory: None,
                })
            }
        }
    }
}

pub struct Services {
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: Arc<CompletionMonitor>,
    pub memory: Option<MemoryCollaborators>,
}

/// Build the trigger and monitor pipelines. Called once at startup.
pub fn build(config: &GantryConfig, collaborators: Collaborators) -> Services {
    let failures = FailureRouter::new(
        collaborators.dead_letters.clone(),
        collaborators.notifier.clone(),
        config.notifications.enabled,
    );

    let registry = TriggerRegistry::with_builtin(config);
    tracing::info!(trigger_types = ?registry.available(), "trigger registry ready");

    let submitter = JobSubmitter::new(
        collaborators.batch.clone(),
        failures.clone(),
        config.batch.clone(),
        config.buckets.clone(),
    );
    let dedup = config
        .dedup
        .enabled
        .then(|| DedupCache::new(Duration::from_secs(config.dedup.window_secs)));

    let dispatcher = Dispatcher::new(registry, submitter, failures.clone(), dedup);
    let summaries = config.monitor.write_summaries.then_some(collaborators.summaries);
    let monitor = CompletionMonitor::new(
        collaborators.batch,
        collaborators.notifier,
        failures,
        summaries,
        config.monitor.describe_jobs,
        config.buckets.output_bucket.clone(),
    );

    Services {
        dispatcher: Arc::new(dispatcher),
        monitor: Arc::new(monitor),
        memory: collaborators.memory,
    }
}
