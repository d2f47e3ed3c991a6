//! Idempotency keys for trigger events.
//!
//! A key is the BLAKE3 hex digest of the event's canonical JSON. Object keys
//! serialize in sorted order, so equal events hash equally regardless of how
//! the sender ordered its fields.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use gantry_core::TriggerEvent;

#[derive(Clone)]
pub struct DedupCache {
    window: Duration,
    /// key → when it was claimed
    seen: Arc<DashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Arc::new(DashMap::new()),
        }
    }

    pub fn key_for(event: &TriggerEvent) -> String {
        let canonical = serde_json::to_vec(event).unwrap_or_default();
        blake3::hash(&canonical).to_hex().to_string()
    }

    /// Claim `key`. False when it was claimed within the window.
    pub fn try_claim(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.seen.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                if now.duration_since(*e.get()) < self.window {
                    false
                } else {
                    e.insert(now);
                    true
                }
            }
            Entry::Vacant(e) => {
                e.insert(now);
                true
            }
        }
    }

    /// Claim `key` for the lifetime of the returned guard. `None` when it was
    /// claimed within the window.
    pub fn claim(&self, key: &str) -> Option<DedupClaim<'_>> {
        self.try_claim(key).then(|| DedupClaim {
            cache: self,
            key: key.to_string(),
            kept: false,
        })
    }

    /// Forget a claim whose event produced no submission.
    pub fn release(&self, key: &str) {
        self.seen.remove(key);
    }

    pub fn purge_expired(&self) {
        let window = self.window;
        self.seen.retain(|_, claimed| claimed.elapsed() < window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A pending claim. Dropped without `keep`, the key is released again, so an
/// invocation cancelled before any submission leaves the event redeliverable.
pub struct DedupClaim<'a> {
    cache: &'a DedupCache,
    key: String,
    kept: bool,
}

impl DedupClaim<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hold the key for the rest of the window. Called once a job is submitted.
    pub fn keep(&mut self) {
        self.kept = true;
    }
}

impl Drop for DedupClaim<'_> {
    fn drop(&mut self) {
        if !self.kept {
            self.cache.release(&self.key);
        }
    }
}
