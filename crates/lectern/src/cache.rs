//! # Dedup cache
//!
//! Single source of truth for "is this key loaded, or loading?". Each key holds
//! either a resolved value or the one shared handle of its in-flight load;
//! concurrent callers attach to that handle instead of starting new work.
//!
//! Loads run as spawned tasks, so they settle even when every caller has
//! dropped its handle. Every pending entry carries a generation number: once an
//! entry is invalidated, the result of the superseded load is handed to its
//! waiters but never written back.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use moka::sync::Cache as MokaCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TaskAborted;

/// Resolved entries kept per cache unless configured otherwise.
pub const DEFAULT_CAPACITY: u64 = 10_000;

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "load panicked".to_owned()
    }
}

type SharedLoad<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

struct Pending<V, E> {
    generation: u64,
    handle: SharedLoad<V, E>,
}

struct InFlight<V, E> {
    pending: HashMap<String, Pending<V, E>>,
    next_generation: u64,
}

/// Handle returned by [`DedupCache::get_or_start`].
pub enum LoadHandle<V, E> {
    /// The key was already resolved.
    Ready(V),
    /// The key is loading; every clone of this handle resolves to the same result.
    Pending(SharedLoad<V, E>),
}

impl<V: Clone, E: Clone> LoadHandle<V, E> {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadHandle::Ready(_))
    }

    pub async fn wait(self) -> Result<V, E> {
        match self {
            LoadHandle::Ready(value) => Ok(value),
            LoadHandle::Pending(handle) => handle.await,
        }
    }
}

/// Number of resolved and pending entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryCounts {
    pub resolved: usize,
    pub pending: usize,
}

/// Resolved values live in a bounded moka cache; pending loads and their
/// generations live in a map behind one lock. Every transition between the
/// two happens while that lock is held.
pub struct DedupCache<V, E> {
    resolved: MokaCache<String, V>,
    in_flight: Arc<Mutex<InFlight<V, E>>>,
}

impl<V, E> Clone for DedupCache<V, E> {
    fn clone(&self) -> Self {
        Self {
            resolved: self.resolved.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<V, E> Default for DedupCache<V, E>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl<V, E> DedupCache<V, E>
where
    V: Clone + Send + Sync + 'static,
{
    /// Cache holding at most `max_capacity` resolved entries. The least
    /// recently used ones are evicted and load again on the next request.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            resolved: MokaCache::builder().max_capacity(max_capacity).build(),
            in_flight: Arc::new(Mutex::new(InFlight {
                pending: HashMap::new(),
                next_generation: 1,
            })),
        }
    }
}

impl<V, E> DedupCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<TaskAborted> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the resolved value for `key`, attach to its in-flight load, or
    /// start a new one with `start`.
    ///
    /// `start` receives the generation of the new entry and must only build
    /// its future: it runs while the cache lock is held, so it must not call
    /// back into this cache.
    pub fn get_or_start<F, Fut>(&self, key: &str, start: F) -> LoadHandle<V, E>
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        // Check and insert under one lock acquisition: no await in between.
        let mut in_flight = self.in_flight.lock();
        if let Some(value) = self.resolved.get(key) {
            trace!(key = %key, "Cache hit");
            return LoadHandle::Ready(value);
        }
        if let Some(pending) = in_flight.pending.get(key) {
            debug!(key = %key, "Attaching to in-flight load");
            return LoadHandle::Pending(pending.handle.clone());
        }

        let generation = in_flight.next_generation;
        in_flight.next_generation += 1;

        let load = start(generation);
        let owner = self.clone();
        let task_key = key.to_owned();
        // The task settles the entry itself; it can only take the lock once
        // this function has inserted the pending entry.
        let task = tokio::spawn(async move {
            let result = match AssertUnwindSafe(load).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(E::from(TaskAborted {
                    key: task_key.clone(),
                    reason: panic_message(panic.as_ref()),
                })),
            };
            owner.settle(&task_key, generation, &result);
            result
        });

        let owner = self.clone();
        let handle_key = key.to_owned();
        let handle = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    let result = Err(E::from(TaskAborted {
                        key: handle_key.clone(),
                        reason: e.to_string(),
                    }));
                    owner.settle(&handle_key, generation, &result);
                    result
                }
            }
        }
        .boxed()
        .shared();

        let previous = in_flight.pending.insert(
            key.to_owned(),
            Pending {
                generation,
                handle: handle.clone(),
            },
        );
        debug_assert!(
            previous.is_none(),
            "two concurrent loads started for the same key"
        );
        debug!(key = %key, generation, "Started load");

        LoadHandle::Pending(handle)
    }

    fn settle(&self, key: &str, generation: u64, result: &Result<V, E>) {
        let mut in_flight = self.in_flight.lock();
        let current = matches!(
            in_flight.pending.get(key),
            Some(pending) if pending.generation == generation
        );
        if !current {
            debug!(key = %key, generation, "Discarding result of superseded load");
            return;
        }

        // A failed load leaves no entry, so the next request starts over.
        in_flight.pending.remove(key);
        if let Ok(value) = result {
            self.resolved.insert(key.to_owned(), value.clone());
        }
    }

    /// Resolved value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        self.resolved.get(key)
    }

    pub fn is_resolved(&self, key: &str) -> bool {
        self.resolved.contains_key(key)
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.in_flight.lock().pending.contains_key(key)
    }

    /// Whether `generation` is still the live load for `key`.
    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        matches!(
            self.in_flight.lock().pending.get(key),
            Some(pending) if pending.generation == generation
        )
    }

    /// Drop one entry, or every entry when `key` is `None`. In-flight loads keep
    /// running but their results are no longer stored.
    pub fn invalidate(&self, key: Option<&str>) {
        let mut in_flight = self.in_flight.lock();
        match key {
            Some(key) => {
                in_flight.pending.remove(key);
                self.resolved.invalidate(key);
            }
            None => {
                in_flight.pending.clear();
                self.resolved.invalidate_all();
            }
        }
    }

    pub fn counts(&self) -> EntryCounts {
        let in_flight = self.in_flight.lock();
        EntryCounts {
            resolved: self.resolved.iter().count(),
            pending: in_flight.pending.len(),
        }
    }
}
