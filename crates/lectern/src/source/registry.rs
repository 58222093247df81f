use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use super::ContentSource;
use crate::error::SourceError;
use crate::item::{CollectionKey, Item, ItemId};

/// A thread-safe constructor for one item.
pub type ItemLoaderFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Item, SourceError>> + Send + Sync>;

/// Dispatch table from identifiers to loader functions, plus the ordered
/// identifier lists of each collection.
#[derive(Clone, Default)]
pub struct Registry {
    collections: HashMap<CollectionKey, Vec<ItemId>>,
    loaders: HashMap<ItemId, ItemLoaderFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the ordered identifiers of `key`.
    pub fn with_collection<I, S>(mut self, key: impl Into<CollectionKey>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ItemId>,
    {
        self.collections
            .insert(key.into(), ids.into_iter().map(Into::into).collect());
        self
    }

    /// Register an async loader for `id`.
    pub fn register<F, Fut>(mut self, id: impl Into<ItemId>, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Item, SourceError>> + Send + 'static,
    {
        let loader: ItemLoaderFn = Arc::new(move || loader().boxed());
        self.loaders.insert(id.into(), loader);
        self
    }

    /// Register an item that is already in memory.
    pub fn register_item(self, item: Item) -> Self {
        let id = item.id.clone();
        self.register(id, move || {
            let item = item.clone();
            async move { Ok(item) }
        })
    }

    /// Registered identifiers, sorted, without loading anything.
    pub fn available_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.loaders.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[async_trait]
impl ContentSource for Registry {
    async fn resolve_identifiers(&self, key: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.collections.get(key).cloned().unwrap_or_default())
    }

    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, SourceError> {
        let Some(loader) = self.loaders.get(id) else {
            debug!(id = %id, "No loader registered");
            return Ok(None);
        };
        let mut item = loader().await?;
        // The registry key is authoritative for identity.
        if item.id != id {
            item.id = id.to_owned();
        }
        Ok(Some(item))
    }

    async fn fetch_collection(&self, key: &str) -> Result<Vec<Item>, SourceError> {
        let Some(ids) = self.collections.get(key) else {
            return Ok(Vec::new());
        };

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.fetch_item(id).await? {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn is_known(&self, key: &str) -> bool {
        self.collections.contains_key(key) || self.loaders.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new()
            .with_collection("module-1", ["module-1-lesson-1", "module-1-lesson-2"])
            .register_item(Item::new("module-1-lesson-1").with_order(1))
            .register("module-1-lesson-2", || async {
                Ok(Item::new("wrong-id").with_title("Heart Chambers Deep Dive"))
            })
    }

    #[tokio::test]
    async fn test_dispatch_by_identifier() {
        let registry = registry();
        let item = registry.fetch_item("module-1-lesson-2").await.unwrap().unwrap();
        assert_eq!(item.id, "module-1-lesson-2");
        assert_eq!(item.label(), "Heart Chambers Deep Dive");
        assert!(registry.fetch_item("module-9-lesson-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collection_listing_and_bulk_fetch() {
        let registry = registry();
        assert_eq!(
            registry.resolve_identifiers("module-1").await.unwrap(),
            vec!["module-1-lesson-1", "module-1-lesson-2"]
        );
        assert!(registry.resolve_identifiers("module-2").await.unwrap().is_empty());
        assert_eq!(registry.fetch_collection("module-1").await.unwrap().len(), 2);
    }

    #[test]
    fn test_known_keys_and_available_ids() {
        let registry = registry();
        assert!(registry.is_known("module-1"));
        assert!(registry.is_known("module-1-lesson-2"));
        assert!(!registry.is_known("module-7"));
        assert_eq!(
            registry.available_ids(),
            vec!["module-1-lesson-1", "module-1-lesson-2"]
        );
    }
}
