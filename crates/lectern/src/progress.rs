//! # Progress broadcasting
//!
//! Per-collection pub/sub of [`LoadingState`] snapshots. Subscribers receive
//! every snapshot published for their key, in publish order, and a late
//! subscriber immediately receives the last known snapshot. A subscriber that
//! panics is logged and skipped; the others still receive the snapshot.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::item::CollectionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preparing,
    Loading,
    Complete,
    Error,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }
}

/// Progress snapshot for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingState {
    /// Identifiers expected; 0 while unresolved
    pub total: usize,
    /// Items materialized so far, never above `total`
    pub loaded: usize,
    /// Label of the most recently completed item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_label: Option<String>,
    pub phase: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoadingState {
    pub fn preparing() -> Self {
        Self {
            total: 0,
            loaded: 0,
            current_label: None,
            phase: Phase::Preparing,
            error: None,
        }
    }

    pub fn loading(total: usize) -> Self {
        Self {
            total,
            phase: Phase::Loading,
            ..Self::preparing()
        }
    }

    pub fn complete(total: usize, loaded: usize) -> Self {
        Self {
            total,
            loaded: loaded.min(total),
            phase: Phase::Complete,
            ..Self::preparing()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            phase: Phase::Error,
            error: Some(error.into()),
            ..Self::preparing()
        }
    }

    /// Next loading snapshot after one more item settled successfully.
    pub fn advanced(&self, label: impl Into<String>) -> Self {
        Self {
            loaded: (self.loaded + 1).min(self.total),
            current_label: Some(label.into()),
            ..self.clone()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.current_label = Some(label.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }
}

pub type ProgressCallback = Arc<dyn Fn(&LoadingState) + Send + Sync>;

type Topics = Mutex<HashMap<CollectionKey, Arc<Topic>>>;

#[derive(Default)]
struct Topic {
    /// Serializes deliveries per key; re-entrant so callbacks may subscribe or
    /// publish on the same key.
    delivery: ReentrantMutex<()>,
    inner: Mutex<TopicInner>,
}

#[derive(Default)]
struct TopicInner {
    last: Option<LoadingState>,
    subscribers: Vec<(u64, ProgressCallback)>,
}

impl TopicInner {
    fn is_idle(&self) -> bool {
        self.last.is_none() && self.subscribers.is_empty()
    }
}

#[derive(Default)]
pub struct ProgressBroadcaster {
    topics: Arc<Topics>,
    next_id: AtomicU64,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn topic(&self, key: &str) -> Arc<Topic> {
        self.topics
            .lock()
            .entry(key.to_owned())
            .or_default()
            .clone()
    }

    /// Register `callback` for `key`. It is called right away with the last
    /// known snapshot, if any. Dropping the returned [`Subscription`] unsubscribes.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&LoadingState) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: ProgressCallback = Arc::new(callback);
        let topic = self.topic(key);

        let _delivery = topic.delivery.lock();
        let snapshot = {
            let mut inner = topic.inner.lock();
            inner.subscribers.push((id, callback.clone()));
            inner.last.clone()
        };
        if let Some(state) = snapshot {
            deliver(key, &callback, &state);
        }

        trace!(key = %key, subscriber = id, "Subscribed to progress");
        Subscription {
            key: key.to_owned(),
            id,
            topics: Arc::downgrade(&self.topics),
        }
    }

    /// Channel form of [`subscribe`](Self::subscribe).
    pub fn watch(&self, key: &str) -> (Subscription, mpsc::UnboundedReceiver<LoadingState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(key, move |state| {
            // A closed receiver just means nobody is watching anymore.
            let _ = tx.send(state.clone());
        });
        (subscription, rx)
    }

    /// Record `state` as the latest snapshot for `key` and hand it to every subscriber.
    pub fn publish(&self, key: &str, state: LoadingState) {
        let topic = self.topic(key);
        let _delivery = topic.delivery.lock();
        let subscribers: Vec<ProgressCallback> = {
            let mut inner = topic.inner.lock();
            inner.last = Some(state.clone());
            inner.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };

        trace!(
            key = %key,
            phase = ?state.phase,
            loaded = state.loaded,
            total = state.total,
            subscribers = subscribers.len(),
            "Publishing progress"
        );
        for callback in &subscribers {
            deliver(key, callback, &state);
        }
    }

    /// Last published snapshot for `key`.
    pub fn last_state(&self, key: &str) -> Option<LoadingState> {
        let topics = self.topics.lock();
        topics.get(key).and_then(|topic| topic.inner.lock().last.clone())
    }

    /// Forget the last snapshot of one key, or of every key. Subscriptions stay
    /// in place so observers follow the next load cycle.
    pub fn reset(&self, key: Option<&str>) {
        let mut topics = self.topics.lock();
        match key {
            Some(key) => {
                let idle = topics.get(key).is_some_and(|topic| {
                    let mut inner = topic.inner.lock();
                    inner.last = None;
                    inner.is_idle()
                });
                if idle {
                    topics.remove(key);
                }
            }
            None => topics.retain(|_, topic| {
                let mut inner = topic.inner.lock();
                inner.last = None;
                !inner.is_idle()
            }),
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        let topics = self.topics.lock();
        topics
            .get(key)
            .map_or(0, |topic| topic.inner.lock().subscribers.len())
    }
}

fn deliver(key: &str, callback: &ProgressCallback, state: &LoadingState) {
    if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
        warn!(key = %key, phase = ?state.phase, "Progress subscriber panicked, continuing");
    }
}

/// Live registration returned by [`ProgressBroadcaster::subscribe`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    key: CollectionKey,
    id: u64,
    topics: Weak<Topics>,
}

impl Subscription {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(topics) = self.topics.upgrade() else {
            return;
        };
        let mut topics = topics.lock();
        let idle = topics.get(&self.key).is_some_and(|topic| {
            let mut inner = topic.inner.lock();
            inner.subscribers.retain(|(id, _)| *id != self.id);
            inner.is_idle()
        });
        if idle {
            topics.remove(&self.key);
        }
        trace!(key = %self.key, subscriber = self.id, "Unsubscribed from progress");
    }
}
