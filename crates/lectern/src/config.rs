use std::time::Duration;

use crate::cache::DEFAULT_CAPACITY;
use crate::profile::{BatchProfile, Platform};
use crate::retry::RetryPolicy;

/// Configurable options for the progressive loader
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Batch sizing, pacing and per-item timeout
    pub profile: BatchProfile,

    /// Backoff applied to failing item fetches
    pub retry: RetryPolicy,

    /// Timeout for identifier resolution and the whole-collection fallback
    pub resolve_timeout: Duration,

    /// Resolved entries kept per cache level before the least recently used
    /// ones are evicted
    pub cache_capacity: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::for_profile(BatchProfile::default())
    }
}

impl LoaderConfig {
    pub fn builder() -> crate::builder::LoaderConfigBuilder {
        crate::builder::LoaderConfigBuilder::new()
    }

    /// Config derived from one profile: the retry budget follows
    /// `max_retries` and resolution shares the item timeout.
    pub fn for_profile(profile: BatchProfile) -> Self {
        Self {
            retry: RetryPolicy::default().with_max_attempts(profile.max_retries),
            resolve_timeout: profile.fetch_timeout,
            cache_capacity: DEFAULT_CAPACITY,
            profile,
        }
    }

    pub fn for_platform(platform: Platform) -> Self {
        Self::for_profile(BatchProfile::for_platform(platform))
    }
}
