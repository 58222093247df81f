//! # Content sources
//!
//! The loader never talks to storage directly. Everything it knows about
//! catalogs and items comes through [`ContentSource`]:
//!
//! - [`Registry`]: identifiers mapped to async loader functions
//! - [`BundledStore`]: JSON files shipped on disk
//! - [`HttpSource`]: a remote lessons catalog

mod bundled;
mod http;
mod registry;

pub use bundled::BundledStore;
pub use http::HttpSource;
pub use registry::{ItemLoaderFn, Registry};

use async_trait::async_trait;

use crate::error::SourceError;
use crate::item::Item;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Ordered identifiers belonging to `key`. An empty list is a valid answer
    /// and sends the loader down the whole-collection path.
    async fn resolve_identifiers(&self, key: &str) -> Result<Vec<String>, SourceError>;

    /// A single item, or `None` when no content exists for `id`.
    async fn fetch_item(&self, id: &str) -> Result<Option<Item>, SourceError>;

    /// Every item of `key` in one call, for sources without per-item listing.
    async fn fetch_collection(&self, key: &str) -> Result<Vec<Item>, SourceError>;

    /// Cheap, fetch-free check that `key` (a collection key or an item
    /// identifier) is within what this source can serve.
    fn is_known(&self, _key: &str) -> bool {
        true
    }
}
