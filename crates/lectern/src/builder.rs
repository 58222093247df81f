//! # Builder for LoaderConfig
//!
//! Fluent construction of a [`LoaderConfig`], starting from the profile of the
//! detected platform.
//!
//! ```
//! use std::time::Duration;
//! use lectern_engine::{LoaderConfig, Platform};
//!
//! let config = LoaderConfig::builder()
//!     .with_platform(Platform::Android)
//!     .with_batch_size(4)
//!     .with_inter_batch_delay(Duration::from_millis(50))
//!     .build();
//!
//! assert_eq!(config.profile.batch_size, 4);
//! assert_eq!(config.retry.max_attempts, 3);
//! ```

use std::time::Duration;

use crate::config::LoaderConfig;
use crate::profile::{BatchProfile, Platform};
use crate::retry::RetryPolicy;

/// Builder for creating LoaderConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct LoaderConfigBuilder {
    config: LoaderConfig,
    /// Set once the retry policy is given explicitly; profile changes then
    /// stop overriding its attempt budget.
    explicit_retry: bool,
    explicit_resolve_timeout: bool,
}

impl LoaderConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
            explicit_retry: false,
            explicit_resolve_timeout: false,
        }
    }

    /// Replace the profile with the one for `platform`
    pub fn with_platform(self, platform: Platform) -> Self {
        self.with_profile(BatchProfile::for_platform(platform))
    }

    pub fn with_profile(mut self, profile: BatchProfile) -> Self {
        self.config.profile = profile;
        self.sync_from_profile();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.profile = self.config.profile.with_batch_size(batch_size);
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.config.profile = self.config.profile.with_inter_batch_delay(delay);
        self
    }

    /// Set the per-attempt item fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.profile = self.config.profile.with_fetch_timeout(timeout);
        self.sync_from_profile();
        self
    }

    /// Set the number of attempts per item, the first one included
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.profile = self.config.profile.with_max_retries(max_retries);
        self.config.retry = self.config.retry.with_max_attempts(max_retries);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.profile = self.config.profile.with_max_retries(retry.max_attempts);
        self.config.retry = retry;
        self.explicit_retry = true;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = timeout;
        self.explicit_resolve_timeout = true;
        self
    }

    /// Bound the number of resolved collections, and separately of items
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.cache_capacity = capacity.max(1);
        self
    }

    fn sync_from_profile(&mut self) {
        if self.explicit_retry {
            self.config.profile = self
                .config
                .profile
                .with_max_retries(self.config.retry.max_attempts);
        } else {
            self.config.retry = self
                .config
                .retry
                .with_max_attempts(self.config.profile.max_retries);
        }
        if !self.explicit_resolve_timeout {
            self.config.resolve_timeout = self.config.profile.fetch_timeout;
        }
    }

    pub fn build(self) -> LoaderConfig {
        self.config
    }
}

impl Default for LoaderConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
