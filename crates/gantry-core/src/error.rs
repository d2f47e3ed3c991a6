//! Error kinds shared by the dispatcher and the completion monitor.
//!
//! Every variant except `DeadLetterWrite` is recoverable: the invocation
//! converts it into a dead-letter entry and reports success to the host.

use serde::{Deserialize, Serialize};

/// Coarse classification recorded on every dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    UnknownTriggerType,
    InvalidResourceSpec,
    BackendSubmissionFailure,
    PublishFailure,
    DeadLetterWriteFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::UnknownTriggerType => "unknown_trigger_type",
            Self::InvalidResourceSpec => "invalid_resource_spec",
            Self::BackendSubmissionFailure => "backend_submission_failure",
            Self::PublishFailure => "publish_failure",
            Self::DeadLetterWriteFailure => "dead_letter_write_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("unknown trigger type '{trigger_type}' (available: {available})")]
    UnknownTriggerType {
        trigger_type: String,
        available: String,
    },
    #[error("invalid resource spec: {0}")]
    InvalidResourceSpec(String),
    #[error("batch submission failed: {0}")]
    BackendSubmission(String),
    #[error("notification publish failed: {0}")]
    Publish(String),
    #[error("dead-letter write failed: {0}")]
    DeadLetterWrite(String),
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput(_) => ErrorKind::MalformedInput,
            Self::UnknownTriggerType { .. } => ErrorKind::UnknownTriggerType,
            Self::InvalidResourceSpec(_) => ErrorKind::InvalidResourceSpec,
            Self::BackendSubmission(_) => ErrorKind::BackendSubmissionFailure,
            Self::Publish(_) => ErrorKind::PublishFailure,
            Self::DeadLetterWrite(_) => ErrorKind::DeadLetterWriteFailure,
        }
    }

    /// Only a failed dead-letter write escapes the invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeadLetterWrite(_))
    }
}
