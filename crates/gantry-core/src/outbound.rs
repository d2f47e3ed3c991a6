//! Outbound messages: operator notifications, dead-letter entries, and job
//! summaries.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// Human-readable summary of a job outcome or processing failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            severity: Severity::Info,
        }
    }

    pub fn error(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            severity: Severity::Error,
        }
    }
}

/// Which pipeline an unprocessable event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Trigger,
    JobState,
}

/// How `original_payload` holds the inbound bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// The payload text itself.
    #[default]
    Utf8,
    /// Standard base64 of bytes that were not valid UTF-8.
    Base64,
}

/// An event the system could not process, preserved for manual inspection.
/// Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEnvelope {
    pub source: EventSource,
    /// Raw inbound payload, verbatim, in `payload_encoding`.
    pub original_payload: String,
    #[serde(default)]
    pub payload_encoding: PayloadEncoding,
    pub error_kind: ErrorKind,
    pub error_reason: String,
    /// When the original event reached this process.
    pub received_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEnvelope {
    pub fn new(
        source: EventSource,
        raw: &[u8],
        error_kind: ErrorKind,
        error_reason: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let (original_payload, payload_encoding) = match std::str::from_utf8(raw) {
            Ok(text) => (text.to_string(), PayloadEncoding::Utf8),
            Err(_) => (STANDARD.encode(raw), PayloadEncoding::Base64),
        };
        Self {
            source,
            original_payload,
            payload_encoding,
            error_kind,
            error_reason: error_reason.into(),
            received_at,
            dead_lettered_at: Utc::now(),
        }
    }

    /// The inbound bytes exactly as received.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.payload_encoding {
            PayloadEncoding::Utf8 => Ok(self.original_payload.as_bytes().to_vec()),
            PayloadEncoding::Base64 => STANDARD.decode(&self.original_payload),
        }
    }
}

// ── Job summary ───────────────────────────────────────────────────────────────

/// Record of a finished job, written to the output bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_name: String,
    pub job_id: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Backend description when available, otherwise the state event.
    pub details: serde_json::Value,
}

impl JobSummary {
    /// `job-summaries/<YYYY-MM-DD>/<name>-<id>.json`, dated by `timestamp`.
    pub fn object_key(&self) -> String {
        format!(
            "job-summaries/{}/{}-{}.json",
            self.timestamp.format("%Y-%m-%d"),
            self.job_name,
            self.job_id
        )
    }
}
