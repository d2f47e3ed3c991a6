//! Notifier — single best-effort publish to the pub/sub topic.
//!
//! No batching, no retry. The caller decides what a failure means.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use gantry_core::Notification;

use crate::retained::Retained;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("publish to '{topic}' failed: {message}")]
pub struct PublishError {
    pub topic: String,
    pub message: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError>;
}

// ── HTTP gateway ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct PublishBody<'a> {
    topic: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Publishes via `POST {base}/topics/{topic}/messages`.
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    topic: String,
}

impl HttpNotifier {
    pub fn new(base_url: &str, topic: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
        })
    }

    fn fail(&self, message: impl Into<String>) -> PublishError {
        PublishError {
            topic: self.topic.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        let body = PublishBody {
            topic: &self.topic,
            notification,
        };
        let resp = self
            .client
            .post(format!("{}/topics/{}/messages", self.base_url, self.topic))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.fail(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(self.fail(format!("{status}: {text}")));
        }

        tracing::info!(subject = %notification.subject, "notification sent");
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// Keeps the most recent `retention` notifications in process.
#[derive(Clone, Default)]
pub struct MemoryNotifier {
    published: Arc<Retained<Notification>>,
    failing: Arc<AtomicBool>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            published: Arc::new(Retained::new(retention)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every further publish fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn published(&self) -> Vec<Notification> {
        self.published.snapshot()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, notification: &Notification) -> Result<(), PublishError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(PublishError {
                topic: "memory".to_string(),
                message: "topic unavailable".to_string(),
            });
        }
        self.published
            .push(notification.clone())
            .map_err(|e| PublishError {
                topic: "memory".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
