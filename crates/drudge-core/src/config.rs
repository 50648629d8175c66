//! Configuration for the queue and both worker flavors.
//!
//! Normalization happens at construction, so a config value read back is
//! always the effective one.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::sink::ExceptionSink;

pub const DEFAULT_POLL_QUEUE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_MAX_CONCURRENT_COUNT: usize = 5;

pub const POLL_QUEUE_DELAY_ENV: &str = "DRUDGE_POLL_QUEUE_DELAY_MS";
pub const MAX_CONCURRENT_COUNT_ENV: &str = "DRUDGE_MAX_CONCURRENT_COUNT";

fn normalize_delay(delay: Duration) -> Duration {
    if delay.is_zero() {
        DEFAULT_POLL_QUEUE_DELAY
    } else {
        delay
    }
}

fn normalize_concurrency(count: usize) -> usize {
    if count == 0 {
        DEFAULT_MAX_CONCURRENT_COUNT
    } else {
        count
    }
}

/// Queue-level configuration. Built once at startup, read-only afterwards.
#[derive(Clone, Default)]
pub struct QueueConfig {
    on_exception: Option<Arc<dyn ExceptionSink>>,
}

impl QueueConfig {
    /// No sink: failures are still returned to the caller, just not reported.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(self, sink: impl ExceptionSink + 'static) -> Self {
        self.with_shared_sink(Arc::new(sink))
    }

    pub fn with_shared_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.on_exception = Some(sink);
        self
    }

    pub fn on_exception(&self) -> Option<&dyn ExceptionSink> {
        self.on_exception.as_deref()
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("on_exception", &self.on_exception.is_some())
            .finish()
    }
}

/// Sequential worker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    poll_queue_delay: Duration,
}

impl WorkerConfig {
    /// A zero delay is replaced by [`DEFAULT_POLL_QUEUE_DELAY`].
    pub fn new(poll_queue_delay: Duration) -> Self {
        Self {
            poll_queue_delay: normalize_delay(poll_queue_delay),
        }
    }

    pub fn poll_queue_delay(&self) -> Duration {
        self.poll_queue_delay
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_QUEUE_DELAY)
    }
}

/// Bounded-concurrency pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    poll_queue_delay: Duration,
    max_concurrent_count: usize,
}

impl PoolConfig {
    /// A zero delay becomes [`DEFAULT_POLL_QUEUE_DELAY`], a zero ceiling becomes
    /// [`DEFAULT_MAX_CONCURRENT_COUNT`].
    pub fn new(poll_queue_delay: Duration, max_concurrent_count: usize) -> Self {
        Self {
            poll_queue_delay: normalize_delay(poll_queue_delay),
            max_concurrent_count: normalize_concurrency(max_concurrent_count),
        }
    }

    pub fn poll_queue_delay(&self) -> Duration {
        self.poll_queue_delay
    }

    pub fn max_concurrent_count(&self) -> usize {
        self.max_concurrent_count
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_QUEUE_DELAY, DEFAULT_MAX_CONCURRENT_COUNT)
    }
}

/// Raw, signed settings as they arrive from the environment or a config file.
///
/// Negative and zero values are legal here; they are normalized when converted
/// into [`WorkerConfig`] or [`PoolConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub poll_queue_delay_ms: i64,
    pub max_concurrent_count: i64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_queue_delay_ms: DEFAULT_POLL_QUEUE_DELAY.as_millis() as i64,
            max_concurrent_count: DEFAULT_MAX_CONCURRENT_COUNT as i64,
        }
    }
}

impl WorkerSettings {
    /// Read settings from environment variables.
    ///
    /// - `DRUDGE_POLL_QUEUE_DELAY_MS`: poll delay in milliseconds
    /// - `DRUDGE_MAX_CONCURRENT_COUNT`: pool ceiling
    ///
    /// Unset or unparsable variables fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: i64| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .unwrap_or(fallback)
        };
        Self {
            poll_queue_delay_ms: read(POLL_QUEUE_DELAY_ENV, defaults.poll_queue_delay_ms),
            max_concurrent_count: read(MAX_CONCURRENT_COUNT_ENV, defaults.max_concurrent_count),
        }
    }

    fn poll_queue_delay(&self) -> Duration {
        // 0 以下は WorkerConfig 側で 100ms に丸められる
        u64::try_from(self.poll_queue_delay_ms)
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(self.poll_queue_delay())
    }

    pub fn pool_config(&self) -> PoolConfig {
        let count = usize::try_from(self.max_concurrent_count).unwrap_or(0);
        PoolConfig::new(self.poll_queue_delay(), count)
    }
}
