//! # Progressive loader
//!
//! Entry point of the engine. A collection load runs through
//! `preparing -> loading -> complete | error`:
//!
//! 1. a resolved collection is returned straight from the cache, without
//!    progress events; an in-flight one is joined;
//! 2. otherwise the identifier list is resolved, falling back to a single
//!    whole-collection fetch when the list is empty;
//! 3. identifiers are loaded in paced batches, each item through the item cache
//!    with retries and a per-attempt timeout;
//! 4. the successes are sorted into presentation order and cached.
//!
//! Item failures only skip the item. A resolution failure fails the cycle,
//! rolls back the cache entry and is published as `phase: error`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::batch::BatchScheduler;
use crate::cache::{DedupCache, EntryCounts, LoadHandle};
use crate::config::LoaderConfig;
use crate::error::{FetchError, LoadError};
use crate::fetcher::ItemFetcher;
use crate::item::{CollectionKey, Item, ItemId, sort_for_presentation};
use crate::progress::{LoadingState, ProgressBroadcaster, Subscription};
use crate::resolver::IdentifierResolver;
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::source::ContentSource;

/// Label published while the whole-collection fallback is running.
const WHOLE_COLLECTION_LABEL: &str = "Loading full collection";

/// Snapshot of both cache levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub collections_cached: usize,
    pub collections_loading: usize,
    pub items_cached: usize,
    pub items_loading: usize,
}

impl CacheStats {
    fn from_counts(collections: EntryCounts, items: EntryCounts) -> Self {
        Self {
            collections_cached: collections.resolved,
            collections_loading: collections.pending,
            items_cached: items.resolved,
            items_loading: items.pending,
        }
    }
}

struct LoaderInner {
    source: Arc<dyn ContentSource>,
    config: LoaderConfig,
    resolver: IdentifierResolver,
    fetcher: ItemFetcher,
    scheduler: BatchScheduler,
    collections: DedupCache<Arc<[Item]>, LoadError>,
    items: DedupCache<Option<Item>, FetchError>,
    /// Identifiers resolved for each collection, used to evict its items
    members: Mutex<HashMap<CollectionKey, Vec<ItemId>>>,
    progress: ProgressBroadcaster,
}

/// Deduplicating, batched collection loader with progress reporting.
///
/// Cloning is cheap; clones share caches and subscribers.
#[derive(Clone)]
pub struct ProgressiveLoader {
    inner: Arc<LoaderInner>,
}

impl ProgressiveLoader {
    pub fn new(source: Arc<dyn ContentSource>, config: LoaderConfig) -> Self {
        info!(profile = %config.profile, "Creating progressive loader");
        let resolver = IdentifierResolver::new(source.clone(), config.resolve_timeout);
        let fetcher = ItemFetcher::new(source.clone(), config.profile.fetch_timeout);
        let scheduler = BatchScheduler::new(config.profile);
        let capacity = config.cache_capacity;

        Self {
            inner: Arc::new(LoaderInner {
                source,
                config,
                resolver,
                fetcher,
                scheduler,
                collections: DedupCache::with_capacity(capacity),
                items: DedupCache::with_capacity(capacity),
                members: Mutex::new(HashMap::new()),
                progress: ProgressBroadcaster::new(),
            }),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Load every item of `key`, in presentation order.
    ///
    /// Concurrent calls for one key share a single load and receive the same
    /// list. Items that could not be loaded are left out.
    pub async fn load_collection(&self, key: &str) -> Result<Arc<[Item]>, LoadError> {
        let inner = self.inner.clone();
        let owned_key = key.to_owned();
        self.inner
            .collections
            .get_or_start(key, move |generation| inner.run_cycle(owned_key, generation))
            .wait()
            .await
    }

    /// Load one item through the item cache. `Ok(None)` means it does not exist.
    pub async fn load_item(&self, id: &str) -> Result<Option<Item>, FetchError> {
        self.inner.item_handle(id).wait().await
    }

    /// Observe progress of `key`; the last known snapshot is delivered at once.
    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&LoadingState) + Send + Sync + 'static,
    {
        self.inner.progress.subscribe(key, callback)
    }

    pub fn watch(&self, key: &str) -> (Subscription, mpsc::UnboundedReceiver<LoadingState>) {
        self.inner.progress.watch(key)
    }

    /// Last snapshot published for `key` in the current cycle.
    pub fn loading_state(&self, key: &str) -> Option<LoadingState> {
        self.inner.progress.last_state(key)
    }

    /// Forget `key` (its items included), or everything when `None`, so the
    /// next request loads again. In-flight loads finish but are not stored.
    pub fn clear_cache(&self, key: Option<&str>) {
        let inner = &self.inner;
        match key {
            Some(key) => {
                inner.collections.invalidate(Some(key));
                let members = inner.members.lock().remove(key).unwrap_or_default();
                for id in &members {
                    inner.items.invalidate(Some(id));
                }
                info!(key = %key, items = members.len(), "Cleared collection cache");
            }
            None => {
                inner.collections.invalidate(None);
                inner.items.invalidate(None);
                inner.members.lock().clear();
                info!("Cleared all caches");
            }
        }
        inner.progress.reset(key);
    }

    /// Whether the source serves `key`. Never fetches.
    pub fn is_known(&self, key: &str) -> bool {
        self.inner.source.is_known(key)
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.inner.collections.is_resolved(key)
    }

    /// Load `keys` one after another, skipping resolved ones. Failures are
    /// logged and skipped. Returns the number of collections loaded by this call.
    pub async fn preload<I, S>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut loaded = 0;
        for key in keys {
            let key = key.as_ref();
            if self.is_loaded(key) {
                debug!(key = %key, "Already loaded, skipping preload");
                continue;
            }
            match self.load_collection(key).await {
                Ok(items) => {
                    debug!(key = %key, items = items.len(), "Preloaded collection");
                    loaded += 1;
                }
                Err(e) => warn!(key = %key, error = %e, "Preload failed"),
            }
        }
        loaded
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats::from_counts(self.inner.collections.counts(), self.inner.items.counts())
    }
}

impl LoaderInner {
    /// Publish only while `generation` is the live load of `key`.
    fn publish(&self, key: &str, generation: u64, state: LoadingState) {
        if self.collections.is_current(key, generation) {
            self.progress.publish(key, state);
        } else {
            debug!(key = %key, generation, phase = ?state.phase, "Dropping progress of superseded load");
        }
    }

    fn item_handle(&self, id: &str) -> LoadHandle<Option<Item>, FetchError> {
        let fetcher = self.fetcher.clone();
        let retry = self.config.retry;
        let owned_id = id.to_owned();
        self.items
            .get_or_start(id, move |_| fetch_with_retry(fetcher, retry, owned_id))
    }

    /// Item load for one cycle. A superseded cycle fetches outside the item
    /// cache so nothing it loads outlives `clear_cache`.
    fn cycle_item(
        &self,
        key: &str,
        generation: u64,
        id: &ItemId,
    ) -> BoxFuture<'static, Result<Option<Item>, FetchError>> {
        let fetcher = self.fetcher.clone();
        let retry = self.config.retry;
        if !self.collections.is_current(key, generation) {
            debug!(key = %key, id = %id, "Load superseded, fetching item uncached");
            return fetch_with_retry(fetcher, retry, id.clone()).boxed();
        }

        let mut started = false;
        let owned_id = id.clone();
        let handle = self.items.get_or_start(id, |_| {
            started = true;
            fetch_with_retry(fetcher, retry, owned_id)
        });
        // Cleared between the check and the insert: drop the entry we created.
        if started && !self.collections.is_current(key, generation) {
            self.items.invalidate(Some(id));
        }
        handle.wait().boxed()
    }

    async fn run_cycle(
        self: Arc<Self>,
        key: CollectionKey,
        generation: u64,
    ) -> Result<Arc<[Item]>, LoadError> {
        self.publish(&key, generation, LoadingState::preparing());

        let ids = match self.resolver.resolve(&key).await {
            Ok(ids) => ids,
            Err(e) => return Err(self.fail(&key, generation, e)),
        };

        if ids.is_empty() {
            return self.load_whole(&key, generation).await;
        }

        {
            // Checked under the members lock so a concurrent clear_cache either
            // sees the entry or has already superseded this cycle.
            let mut members = self.members.lock();
            if self.collections.is_current(&key, generation) {
                members.insert(key.clone(), ids.clone());
            }
        }

        let total = ids.len();
        info!(
            key = %key,
            total,
            batches = self.scheduler.batch_count(total),
            "Loading collection"
        );
        let mut state = LoadingState::loading(total);
        self.publish(&key, generation, state.clone());

        let run = self
            .scheduler
            .run(
                &ids,
                |id| {
                    let load = self.cycle_item(&key, generation, id);
                    let id = id.clone();
                    async move {
                        match load.await {
                            Ok(item) => item,
                            Err(e) => {
                                warn!(id = %id, error = %e, "Skipping item");
                                None
                            }
                        }
                    }
                },
                |_, item| {
                    if let Some(item) = item {
                        state = state.advanced(item.label());
                    }
                    self.publish(&key, generation, state.clone());
                },
            )
            .await;

        let mut loaded = run.loaded;
        sort_for_presentation(&mut loaded);
        let items: Arc<[Item]> = loaded.into_iter().map(|(_, item)| item).collect();

        if run.skipped.is_empty() {
            info!(key = %key, loaded = items.len(), "Collection loaded");
        } else {
            warn!(
                key = %key,
                loaded = items.len(),
                total,
                skipped = ?run.skipped,
                "Collection loaded with skipped items"
            );
        }
        self.publish(&key, generation, LoadingState::complete(total, items.len()));
        Ok(items)
    }

    async fn load_whole(&self, key: &str, generation: u64) -> Result<Arc<[Item]>, LoadError> {
        debug!(key = %key, "No identifiers listed, fetching whole collection");
        self.publish(
            key,
            generation,
            LoadingState::loading(0).with_label(WHOLE_COLLECTION_LABEL),
        );

        let items = match self.resolver.fetch_whole(key).await {
            Ok(items) => items,
            Err(e) => return Err(self.fail(key, generation, e)),
        };

        info!(key = %key, loaded = items.len(), "Collection loaded in one request");
        self.publish(
            key,
            generation,
            LoadingState::complete(items.len(), items.len()),
        );
        Ok(items.into())
    }

    fn fail(&self, key: &str, generation: u64, e: LoadError) -> LoadError {
        error!(key = %key, error = %e, "Collection load failed");
        self.publish(key, generation, LoadingState::failed(e.to_string()));
        e
    }
}

async fn fetch_with_retry(
    fetcher: ItemFetcher,
    retry: RetryPolicy,
    id: ItemId,
) -> Result<Option<Item>, FetchError> {
    let outcome = retry.attempt(|_| fetcher.fetch(&id)).await;
    match outcome {
        RetryOutcome::Loaded { value, attempts } => {
            debug!(id = %id, attempts, "Item loaded");
            Ok(Some(value))
        }
        RetryOutcome::Absent { .. } => {
            debug!(id = %id, "Item has no content");
            Ok(None)
        }
        RetryOutcome::Exhausted { error, .. } => Err(error),
    }
}
