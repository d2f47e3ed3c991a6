//! gantry-services — trigger dispatch and completion monitoring.
//!
//! The dispatcher turns inbound trigger messages into batch submissions; the
//! monitor turns terminal job state changes into notifications. External
//! systems sit behind `BatchBackend`, `Notifier`, `DeadLetterQueue`, and
//! `SummarySink`.

pub mod backend;
pub mod dead_letter;
pub mod dedup;
pub mod dispatcher;
pub mod handlers;
pub mod monitor;
pub mod notifier;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod retained;
pub mod submitter;
pub mod summary;

pub use backend::{BatchBackend, HttpBatchBackend, MemoryBatchBackend};
pub use dead_letter::{DeadLetterQueue, FailureRouter, HttpDeadLetterQueue, MemoryDeadLetterQueue};
pub use dedup::DedupCache;
pub use dispatcher::{DispatchReport, Dispatcher, EventOutcome};
pub use monitor::{CompletionMonitor, MonitorOutcome};
pub use notifier::{HttpNotifier, MemoryNotifier, Notifier};
pub use pipeline::{build, Collaborators, MemoryCollaborators, Services};
pub use registry::{HandlerInfo, TriggerHandler, TriggerRegistry};
pub use resolver::{ResolvedResources, ResourceOverrides, ResourceResolver};
pub use submitter::{JobSubmitter, SubmitOutcome};
pub use summary::{HttpSummarySink, MemorySummarySink, StoredSummary, SummarySink};
