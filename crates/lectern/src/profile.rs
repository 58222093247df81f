//! # Platform profiles
//!
//! Constrained mobile runtimes get smaller batches, longer pauses and more
//! generous timeouts. The profile is selected once per process.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Environment variable that overrides [`Platform::detect`].
pub const PLATFORM_ENV: &str = "LECTERN_PLATFORM";

/// Runtime classification used to pick a [`BatchProfile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Platform {
    Android,
    Ios,
    Web,
    Desktop,
}

impl Platform {
    /// Classify the current process. `LECTERN_PLATFORM` wins over the compile target.
    pub fn detect() -> Self {
        if let Ok(value) = std::env::var(PLATFORM_ENV) {
            match value.parse() {
                Ok(platform) => return platform,
                Err(e) => warn!(value = %value, error = %e, "Ignoring invalid platform override"),
            }
        }

        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_family = "wasm") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }

    /// Native mobile runtime (as opposed to a browser or desktop process).
    pub fn is_native_mobile(self) -> bool {
        matches!(self, Platform::Android | Platform::Ios)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Android => "android",
            Platform::Ios => "ios",
            Platform::Web => "web",
            Platform::Desktop => "desktop",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            "web" => Ok(Platform::Web),
            "desktop" => Ok(Platform::Desktop),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// Batching parameters for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProfile {
    /// Items fetched concurrently per batch. Always at least 1.
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub inter_batch_delay: Duration,
    /// Timeout for a single fetch attempt
    pub fetch_timeout: Duration,
    /// Total attempts allowed per item
    pub max_retries: u32,
}

impl BatchProfile {
    pub fn new(
        batch_size: usize,
        inter_batch_delay: Duration,
        fetch_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            batch_size: batch_size.max(1),
            inter_batch_delay,
            fetch_timeout,
            max_retries: max_retries.max(1),
        }
    }

    pub fn for_platform(platform: Platform) -> Self {
        let native = platform.is_native_mobile();
        let android = platform == Platform::Android;

        Self::new(
            if android { 2 } else { 3 },
            Duration::from_millis(if native { 200 } else { 100 }),
            Duration::from_secs(if native { 15 } else { 10 }),
            if android { 3 } else { 2 },
        )
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }
}

impl Default for BatchProfile {
    fn default() -> Self {
        Self::for_platform(Platform::detect())
    }
}

impl fmt::Display for BatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch_size={}, inter_batch_delay={}ms, fetch_timeout={}s, max_retries={}",
            self.batch_size,
            self.inter_batch_delay.as_millis(),
            self.fetch_timeout.as_secs(),
            self.max_retries
        )
    }
}
