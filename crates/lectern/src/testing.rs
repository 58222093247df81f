//! Scripted in-memory source for unit tests.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::SourceError;
use crate::item::{CollectionKey, Item, ItemId};
use crate::source::ContentSource;

const HANG: Duration = Duration::from_secs(3600);

#[derive(Default)]
pub(crate) struct ScriptedSource {
    collections: HashMap<CollectionKey, Vec<ItemId>>,
    whole: HashMap<CollectionKey, Vec<Item>>,
    items: HashMap<ItemId, Item>,
    absent: HashSet<ItemId>,
    failing_resolution: HashSet<CollectionKey>,
    failing_whole: HashSet<CollectionKey>,
    resolve_latency: HashMap<CollectionKey, Duration>,
    item_latency: HashMap<ItemId, Duration>,
    /// Number of leading attempts that fail, per identifier
    item_failures: HashMap<ItemId, u32>,
    /// Number of leading attempts that hang past any timeout, per identifier
    item_hangs: HashMap<ItemId, u32>,
    calls: Mutex<Calls>,
}

#[derive(Default)]
struct Calls {
    resolve: HashMap<CollectionKey, u32>,
    item: HashMap<ItemId, u32>,
    whole: HashMap<CollectionKey, u32>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection<I, S>(mut self, key: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.collections
            .insert(key.to_owned(), ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_whole_collection(mut self, key: &str, items: Vec<Item>) -> Self {
        self.whole.insert(key.to_owned(), items);
        self
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.insert(item.id.clone(), item);
        self
    }

    pub fn absent(mut self, id: &str) -> Self {
        self.absent.insert(id.to_owned());
        self
    }

    pub fn fail_resolution(mut self, key: &str) -> Self {
        self.failing_resolution.insert(key.to_owned());
        self
    }

    pub fn fail_whole(mut self, key: &str) -> Self {
        self.failing_whole.insert(key.to_owned());
        self
    }

    pub fn resolve_latency(mut self, key: &str, latency: Duration) -> Self {
        self.resolve_latency.insert(key.to_owned(), latency);
        self
    }

    pub fn item_latency(mut self, id: &str, latency: Duration) -> Self {
        self.item_latency.insert(id.to_owned(), latency);
        self
    }

    pub fn fail_item(mut self, id: &str, attempts: u32) -> Self {
        self.item_failures.insert(id.to_owned(), attempts);
        self
    }

    pub fn hang_item(mut self, id: &str, attempts: u32) -> Self {
        self.item_hangs.insert(id.to_owned(), attempts);
        self
    }

    pub fn resolve_calls(&self, key: &str) -> u32 {
        self.calls.lock().resolve.get(key).copied().unwrap_or(0)
    }

    pub fn item_calls(&self, id: &str) -> u32 {
        self.calls.lock().item.get(id).copied().unwrap_or(0)
    }

    pub fn total_item_calls(&self) -> u32 {
        self.calls.lock().item.values().sum()
    }

    pub fn whole_calls(&self, key: &str) -> u32 {
        self.calls.lock().whole.get(key).copied().unwrap_or(0)
    }

    fn listed(&self, id: &str) -> bool {
        self.collections.values().any(|ids| ids.iter().any(|i| i == id))
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn resolve_identifiers(&self, key: &str) -> Result<Vec<String>, SourceError> {
        *self.calls.lock().resolve.entry(key.to_owned()).or_default() += 1;
        if let Some(latency) = self.resolve_latency.get(key) {
            tokio::time::sleep(*latency).await;
        }
        if self.failing_resolution.contains(key) {
            return Err(SourceError::Unavailable(format!("catalog offline for {key}")));
        }
        Ok(self.collections.get(key).cloned().unwrap_or_default())
    }

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, SourceError> {
        let attempt = {
            let mut calls = self.calls.lock();
            let count = calls.item.entry(id.to_owned()).or_default();
            *count += 1;
            *count
        };

        if let Some(latency) = self.item_latency.get(id) {
            tokio::time::sleep(*latency).await;
        }
        if attempt <= self.item_hangs.get(id).copied().unwrap_or(0) {
            tokio::time::sleep(HANG).await;
        }
        if attempt <= self.item_failures.get(id).copied().unwrap_or(0) {
            return Err(SourceError::Unavailable(format!("item {id} unavailable")));
        }
        if self.absent.contains(id) {
            return Ok(None);
        }
        if let Some(item) = self.items.get(id) {
            return Ok(Some(item.clone()));
        }
        if self.listed(id) {
            return Ok(Some(Item::new(id).with_title(format!("Item {id}"))));
        }
        Ok(None)
    }

    async fn fetch_collection(&self, key: &str) -> Result<Vec<Item>, SourceError> {
        *self.calls.lock().whole.entry(key.to_owned()).or_default() += 1;
        if self.failing_whole.contains(key) {
            return Err(SourceError::Unavailable(format!("bulk endpoint offline for {key}")));
        }
        Ok(self.whole.get(key).cloned().unwrap_or_default())
    }

    fn is_known(&self, key: &str) -> bool {
        self.collections.contains_key(key) || self.whole.contains_key(key) || self.listed(key)
    }
}
