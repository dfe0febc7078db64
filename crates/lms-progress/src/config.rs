//! Centralized configuration for the progress engine.
//!
//! Default constants live on [`ProgressDefaults`]; the runtime knobs are
//! grouped in [`EngineConfig`], which the builder hands to each component.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProgressError, Result};

/// Default values used when no explicit configuration is supplied.
pub struct ProgressDefaults;

impl ProgressDefaults {
    /// Store freshness window for every populated key.
    pub const PROGRESS_TTL: Duration = Duration::from_secs(5 * 60);
    /// Upper bound on the backend work of a single fetch or write.
    pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
    /// Maximum number of entries in a dependency cache.
    pub const CACHE_CAPACITY: usize = 100;
    /// Default TTL for dependency cache entries.
    pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
    /// Interval of the background expiry sweep.
    pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
    /// Window used for completion velocity.
    pub const ANALYTICS_WINDOW: Duration = Duration::from_secs(28 * 24 * 60 * 60);
}

/// Thresholds for team performance partitioning.
pub struct RollupDefaults;

impl RollupDefaults {
    pub const TOP_PERFORMER_THRESHOLD: u8 = 80;
    pub const STRUGGLING_THRESHOLD: u8 = 30;
    pub const BUCKET_FRACTION: f64 = 0.2;
    pub const IMPROVING_COMPLETION_RATE: f64 = 75.0;
    pub const DECLINING_COMPLETION_RATE: f64 = 40.0;
}

/// Configuration for a [`DependencyCache`](crate::cache::DependencyCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    pub capacity: usize,
    /// TTL applied by callers that do not pass their own.
    pub default_ttl: Duration,
    /// How often the background sweeper purges expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: ProgressDefaults::CACHE_CAPACITY,
            default_ttl: ProgressDefaults::CACHE_TTL,
            sweep_interval: ProgressDefaults::SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Thresholds used by the rollup layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RollupConfig {
    /// Members at or above this overall progress are top performers.
    pub top_performer_threshold: u8,
    /// Members strictly below this overall progress are struggling.
    pub struggling_threshold: u8,
    /// Fraction of the team each partition may hold (at least one member).
    pub bucket_fraction: f64,
    /// Completion rate above which a team is `improving`.
    pub improving_completion_rate: f64,
    /// Completion rate below which a team is `declining`.
    pub declining_completion_rate: f64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            top_performer_threshold: RollupDefaults::TOP_PERFORMER_THRESHOLD,
            struggling_threshold: RollupDefaults::STRUGGLING_THRESHOLD,
            bucket_fraction: RollupDefaults::BUCKET_FRACTION,
            improving_completion_rate: RollupDefaults::IMPROVING_COMPLETION_RATE,
            declining_completion_rate: RollupDefaults::DECLINING_COMPLETION_RATE,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Freshness window for store entries.
    pub progress_ttl: Duration,
    /// Timeout for the backend work of a single fetch or write.
    pub fetch_timeout: Duration,
    /// Share one in-flight fetch among concurrent callers for the same key.
    pub dedupe_inflight: bool,
    /// Window for learning velocity.
    pub analytics_window: Duration,
    pub cache: CacheConfig,
    pub rollup: RollupConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            progress_ttl: ProgressDefaults::PROGRESS_TTL,
            fetch_timeout: ProgressDefaults::FETCH_TIMEOUT,
            dedupe_inflight: true,
            analytics_window: ProgressDefaults::ANALYTICS_WINDOW,
            cache: CacheConfig::default(),
            rollup: RollupConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_progress_ttl(mut self, ttl: Duration) -> Self {
        self.progress_ttl = ttl;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_dedupe_inflight(mut self, enable: bool) -> Self {
        self.dedupe_inflight = enable;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_rollup(mut self, rollup: RollupConfig) -> Self {
        self.rollup = rollup;
        self
    }

    /// Reject configurations that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.progress_ttl.is_zero() {
            return Err(ProgressError::validation(
                "progress_ttl",
                "must be greater than zero",
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ProgressError::validation(
                "fetch_timeout",
                "must be greater than zero",
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ProgressError::validation(
                "cache.capacity",
                "must hold at least one entry",
            ));
        }
        if self.cache.default_ttl.is_zero() {
            return Err(ProgressError::validation(
                "cache.default_ttl",
                "must be greater than zero",
            ));
        }
        let fraction = self.rollup.bucket_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ProgressError::validation(
                "rollup.bucket_fraction",
                format!("must be in (0, 1], got {}", fraction),
            ));
        }
        Ok(())
    }
}
