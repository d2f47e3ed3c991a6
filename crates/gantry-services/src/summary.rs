//! Job summaries — a JSON record per finished job in the output bucket.
//!
//! Written after the completion notification. A failed write is logged and
//! never changes the monitor's outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use gantry_core::JobSummary;

use crate::retained::Retained;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("write of '{bucket}/{key}' failed: {message}")]
pub struct SummaryError {
    pub bucket: String,
    pub key: String,
    pub message: String,
}

#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, summary: &JobSummary) -> Result<(), SummaryError>;
}

// ── HTTP gateway ──────────────────────────────────────────────────────────────

/// Stores via `PUT {base}/buckets/{bucket}/objects/{key}`.
pub struct HttpSummarySink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSummarySink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Percent-encode each segment, keeping the `/` separators.
fn object_path(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl SummarySink for HttpSummarySink {
    async fn put(&self, bucket: &str, key: &str, summary: &JobSummary) -> Result<(), SummaryError> {
        let fail = |message: String| SummaryError {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };
        let resp = self
            .client
            .put(format!(
                "{}/buckets/{}/objects/{}",
                self.base_url,
                urlencoding::encode(bucket),
                object_path(key)
            ))
            .json(summary)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(fail(format!("{status}: {text}")));
        }
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSummary {
    pub bucket: String,
    pub key: String,
    pub summary: JobSummary,
}

/// Keeps the most recent `retention` summaries in process.
#[derive(Clone, Default)]
pub struct MemorySummarySink {
    stored: Arc<Retained<StoredSummary>>,
    failing: Arc<AtomicBool>,
}

impl MemorySummarySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            stored: Arc::new(Retained::new(retention)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn stored(&self) -> Vec<StoredSummary> {
        self.stored.snapshot()
    }
}

#[async_trait]
impl SummarySink for MemorySummarySink {
    async fn put(&self, bucket: &str, key: &str, summary: &JobSummary) -> Result<(), SummaryError> {
        let fail = |message: String| SummaryError {
            bucket: bucket.to_string(),
            key: key.to_string(),
            message,
        };
        if self.failing.load(Ordering::Relaxed) {
            return Err(fail("bucket unavailable".to_string()));
        }
        self.stored
            .push(StoredSummary {
                bucket: bucket.to_string(),
                key: key.to_string(),
                summary: summary.clone(),
            })
            .map_err(|e| fail(e.to_string()))?;
        Ok(())
    }
}
