//! Action layer over the progress store.
//!
//! [`ProgressEngine`] owns the backend handle, the store and the in-flight
//! registry. Every action follows the same shape: check freshness, mark the key
//! loading, run the backend work under a timeout and the engine's cancellation
//! token, then dispatch either the populated data or the error for that key.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lms_progress::{InMemoryBackend, ProgressEngine};
//!
//! let engine = ProgressEngine::builder(Arc::new(InMemoryBackend::new())).build()?;
//! let calculation = engine.calculate_course_progress("user-1", "course-1").await?;
//! println!("{}% ({})", calculation.progress_percentage, calculation.status);
//! ```

mod analytics;
mod batch;
mod builder;
mod fetch;
mod inflight;
mod update;

pub use batch::BatchReport;
pub use builder::ProgressEngineBuilder;

use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::backend::DynBackend;
use crate::cache::{tags, CacheKey, InvalidationScope, InvalidationSink};
use crate::cancel::CancellationToken;
use crate::clock::SharedClock;
use crate::config::EngineConfig;
use crate::error::{ProgressError, Result};
use crate::models::{CourseCalculation, CourseProgress, TeamProgress, UnitProgress};
use crate::store::{ProgressState, ProgressStore, StoreCommand};
use inflight::InFlight;

struct EngineInner {
    backend: DynBackend,
    store: ProgressStore,
    clock: SharedClock,
    config: EngineConfig,
    token: CancellationToken,
    inflight: Arc<InFlight>,
    sinks: RwLock<Vec<Arc<dyn InvalidationSink>>>,
}

/// Progress tracking engine.
///
/// Cheap to clone; clones share the store, backend and in-flight registry.
#[derive(Clone)]
pub struct ProgressEngine {
    inner: Arc<EngineInner>,
}

impl ProgressEngine {
    pub fn builder(backend: DynBackend) -> ProgressEngineBuilder {
        ProgressEngineBuilder::new(backend)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.inner.clock)
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Current immutable snapshot of the store.
    pub fn snapshot(&self) -> Arc<ProgressState> {
        self.inner.store.snapshot()
    }

    // Selectors

    pub fn get_course_progress(&self, user_id: &str) -> Option<Arc<Vec<CourseProgress>>> {
        self.inner.store.get_course_progress(user_id)
    }

    pub fn get_unit_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Option<Arc<Vec<UnitProgress>>> {
        self.inner.store.get_unit_progress(user_id, course_id)
    }

    pub fn get_team_progress(&self, team_id: &str) -> Option<Arc<TeamProgress>> {
        self.inner.store.get_team_progress(team_id)
    }

    pub fn get_calculation(&self, key: &CacheKey) -> Option<CourseCalculation> {
        self.inner.store.get_calculation(key)
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        self.inner.store.is_loading(key)
    }

    pub fn get_error(&self, key: &CacheKey) -> Option<String> {
        self.inner.store.get_error(key)
    }

    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.inner.store.is_fresh(key)
    }

    // Invalidation

    /// Register a cache to be notified of dependency-tag invalidations.
    pub fn register_sink(&self, sink: Arc<dyn InvalidationSink>) {
        self.inner
            .sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Forward a dependency tag to every registered sink.
    pub(crate) fn notify_tag(&self, tag: &str) -> usize {
        let sinks = self.inner.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let removed: usize = sinks.iter().map(|sink| sink.invalidate_tag(tag)).sum();
        if removed > 0 {
            debug!("Tag {} invalidated {} dependent entries", tag, removed);
        }
        removed
    }

    fn notify_all(&self) {
        let sinks = self.inner.sinks.read().unwrap_or_else(PoisonError::into_inner);
        for sink in sinks.iter() {
            sink.invalidate_all();
        }
    }

    /// Drop freshness stamps inside `scope` and the matching dependent entries
    /// of registered sinks. Cached data stays readable until the next fetch.
    pub fn invalidate_cache(&self, scope: InvalidationScope) {
        debug!("Invalidating store scope {:?}", scope);
        match &scope {
            InvalidationScope::All => self.notify_all(),
            InvalidationScope::User(user_id) => {
                self.notify_tag(&tags::user(user_id));
            }
            InvalidationScope::Course(course_id) => {
                self.notify_tag(&tags::course(course_id));
            }
            InvalidationScope::Team(team_id) => {
                self.notify_tag(&tags::team(team_id));
            }
            InvalidationScope::Key(key) => {
                if let Some(user_id) = key.user_id() {
                    self.notify_tag(&tags::user(user_id));
                }
                if let Some(team_id) = key.team_id() {
                    self.notify_tag(&tags::team(team_id));
                }
            }
            InvalidationScope::Kind(_) | InvalidationScope::Pattern(_) => {}
        }
        self.dispatch(StoreCommand::InvalidateCache { scope });
    }

    // Execution helpers

    pub(crate) fn dispatch(&self, command: StoreCommand) -> Arc<ProgressState> {
        self.inner.store.dispatch(command)
    }

    pub(crate) fn backend(&self) -> &DynBackend {
        &self.inner.backend
    }

    /// Run backend work under the fetch timeout and the cancellation token.
    ///
    /// `label` names the work in a timeout error.
    pub(crate) async fn bounded<T, L, F>(&self, label: L, work: F) -> Result<T>
    where
        L: fmt::Display,
        F: Future<Output = Result<T>>,
    {
        self.inner.token.check()?;
        let after = self.inner.config.fetch_timeout;
        tokio::select! {
            biased;
            _ = self.inner.token.cancelled() => Err(ProgressError::Cancelled),
            outcome = tokio::time::timeout(after, work) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ProgressError::Timeout {
                    key: label.to_string(),
                    after,
                }),
            },
        }
    }

    /// Wrap populating work with the loading flag and per-key error slot.
    fn guarded(
        &self,
        key: CacheKey,
        work: BoxFuture<'static, Result<()>>,
    ) -> BoxFuture<'static, Result<()>> {
        let engine = self.clone();
        async move {
            engine.dispatch(StoreCommand::SetLoading {
                key: key.clone(),
                loading: true,
            });

            let outcome = engine.bounded(&key, work).await;
            match &outcome {
                Ok(()) => {
                    if engine.inner.store.is_loading(&key) {
                        engine.dispatch(StoreCommand::SetLoading {
                            key: key.clone(),
                            loading: false,
                        });
                    }
                }
                Err(e) => {
                    warn!("Fetch for {} failed: {}", key, e);
                    engine.dispatch(StoreCommand::SetError {
                        key: key.clone(),
                        message: e.to_string(),
                    });
                }
            }
            outcome
        }
        .boxed()
    }

    /// Run populating work for `key`.
    ///
    /// When `share` is set and de-duplication is enabled, concurrent callers
    /// for the same key await a single run. Forced refreshes pass `share =
    /// false` so they never join a fetch that started before a write.
    pub(crate) async fn run_keyed(
        &self,
        key: CacheKey,
        work: BoxFuture<'static, Result<()>>,
        share: bool,
    ) -> Result<()> {
        let guarded = self.guarded(key.clone(), work);
        if share && self.inner.config.dedupe_inflight {
            self.inner.inflight.join_or_start(key, guarded).await
        } else {
            guarded.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::cache::{dependencies, DependencyCache};
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use std::time::Duration;

    fn engine() -> ProgressEngine {
        ProgressEngine::builder(Arc::new(InMemoryBackend::new()))
            .with_clock(Arc::new(ManualClock::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_invalidate_user_scope_reaches_sinks() {
        let engine = engine();
        let cache: Arc<DependencyCache<String, u32>> = Arc::new(DependencyCache::new(
            CacheConfig::default(),
            engine.clock(),
        ));
        let ttl = Duration::from_secs(60);
        cache.set("a".into(), 1, ttl, dependencies(["user:u1"]));
        cache.set("b".into(), 2, ttl, dependencies(["user:u2"]));
        engine.register_sink(cache.clone());

        engine.invalidate_cache(InvalidationScope::User("u1".into()));
        assert_eq!(cache.len(), 1);

        engine.invalidate_cache(InvalidationScope::All);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_engine_rejects_work() {
        let engine = engine();
        engine.cancellation_token().cancel();

        let key = CacheKey::course("u1");
        let result = engine
            .run_keyed(key.clone(), async { Ok::<(), ProgressError>(()) }.boxed(), true)
            .await;

        assert_eq!(result, Err(ProgressError::Cancelled));
        assert!(!engine.is_loading(&key));
        assert!(engine.get_error(&key).is_some());
    }
}
