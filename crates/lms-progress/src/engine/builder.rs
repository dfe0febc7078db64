//! Builder for configuring a [`ProgressEngine`].

use std::sync::{Arc, RwLock};
use tracing::debug;

use super::inflight::InFlight;
use super::{EngineInner, ProgressEngine};
use crate::backend::DynBackend;
use crate::cache::InvalidationSink;
use crate::cancel::CancellationToken;
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::store::ProgressStore;

/// Composition root for the engine.
///
/// Nothing is global: the backend, clock, cancellation token and any caches
/// that should follow write invalidations are handed in here.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use lms_progress::{EngineConfig, InMemoryBackend, ProgressEngine};
///
/// let engine = ProgressEngine::builder(Arc::new(InMemoryBackend::new()))
///     .with_config(EngineConfig::default().with_fetch_timeout(Duration::from_secs(5)))
///     .build()?;
/// ```
pub struct ProgressEngineBuilder {
    backend: DynBackend,
    clock: SharedClock,
    config: EngineConfig,
    token: CancellationToken,
    sinks: Vec<Arc<dyn InvalidationSink>>,
}

impl ProgressEngineBuilder {
    pub fn new(backend: DynBackend) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            token: CancellationToken::new(),
            sinks: Vec::new(),
        }
    }

    /// Time source for freshness and analytics.
    ///
    /// Default: [`SystemClock`]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Token that aborts every running and future backend call when cancelled.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Cache to notify when writes invalidate dependency tags.
    pub fn with_invalidation_sink(mut self, sink: Arc<dyn InvalidationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<ProgressEngine> {
        self.config.validate()?;
        debug!(
            "Building progress engine (ttl {:?}, timeout {:?}, dedupe {})",
            self.config.progress_ttl, self.config.fetch_timeout, self.config.dedupe_inflight
        );

        let store = ProgressStore::new(Arc::clone(&self.clock), self.config.progress_ttl);
        Ok(ProgressEngine {
            inner: Arc::new(EngineInner {
                backend: self.backend,
                store,
                clock: self.clock,
                config: self.config,
                token: self.token,
                inflight: Arc::new(InFlight::default()),
                sinks: RwLock::new(self.sinks),
            }),
        })
    }
}
