//! # Lectern
//!
//! A library for loading content collections progressively: identifier lists
//! are resolved from a catalog, items are fetched in paced batches with retries,
//! and observers follow each load through progress snapshots.
//!
//! ## Features
//!
//! - Deduplicated loads: concurrent requests for one collection share one load
//! - Platform-sized batches with pacing between them
//! - Bounded retries with exponential backoff; failing items are skipped
//! - Multi-subscriber progress with late-subscriber catch-up
//! - Registry, bundled on-disk and HTTP content sources

pub mod batch;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod item;
pub mod loader;
pub mod profile;
pub mod progress;
pub mod resolver;
pub mod retry;
pub mod source;

#[cfg(test)]
mod testing;

pub use batch::{BatchRun, BatchScheduler};
pub use builder::LoaderConfigBuilder;
pub use cache::{DedupCache, LoadHandle};
pub use config::LoaderConfig;
pub use error::{FetchError, LoadError, SourceError};
pub use fetcher::ItemFetcher;
pub use item::{CollectionKey, Item, ItemId};
pub use loader::{CacheStats, ProgressiveLoader};
pub use profile::{BatchProfile, PLATFORM_ENV, Platform};
pub use progress::{LoadingState, Phase, ProgressBroadcaster, Subscription};
pub use resolver::IdentifierResolver;
pub use retry::{RetryOutcome, RetryPolicy};
pub use source::{BundledStore, ContentSource, HttpSource, Registry};
