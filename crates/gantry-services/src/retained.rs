//! Bounded in-process log behind the memory collaborators.
//!
//! Memory mode is the default, so a long-running daemon must not grow
//! without limit: once full, the oldest entry is evicted.

use std::collections::VecDeque;
use std::sync::Mutex;

/// Entries kept per store unless configured otherwise.
pub const DEFAULT_RETENTION: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("in-memory store lock poisoned")]
pub struct StorePoisoned;

pub(crate) struct Retained<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> Retained<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Append `item`. Returns the entry evicted to make room, if any.
    pub(crate) fn push(&self, item: T) -> Result<Option<T>, StorePoisoned> {
        let mut items = self.items.lock().map_err(|_| StorePoisoned)?;
        let evicted = if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        Ok(evicted)
    }

    /// Oldest first.
    pub(crate) fn snapshot(&self) -> Vec<T> {
        self.items
            .lock()
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }
}

impl<T: Clone> Default for Retained<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}
