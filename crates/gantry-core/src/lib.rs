//! gantry-core — shared types, configuration, and error kinds.
//! All other Gantry crates depend on this one.

pub mod config;
pub mod error;
pub mod job;
pub mod job_state;
pub mod outbound;
pub mod trigger;

pub use error::{DispatchError, ErrorKind};
pub use job::{ComputeClass, EnvVar, JobHandle, JobRequest};
pub use job_state::{ContainerDetail, JobDetail, JobStateEvent, JobStatus};
pub use outbound::{
    DeadLetterEnvelope, EventSource, JobSummary, Notification, PayloadEncoding, Severity,
};
pub use trigger::TriggerEvent;
