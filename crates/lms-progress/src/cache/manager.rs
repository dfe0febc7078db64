//! Dependency-tracked TTL cache with LRU eviction.
//!
//! Each entry carries a set of dependency tags. A lookup only hits when the
//! caller's expected tags equal the stored ones, and
//! [`DependencyCache::invalidate_by_dependency`] drops every entry carrying a
//! tag through an inverted index instead of scanning all keys.

use futures::future::{join_all, BoxFuture};
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use super::key::Dependencies;
use super::traits::{CacheEntry, CacheStats, InvalidationSink};
use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::error::{ProgressError, Result};

struct CacheInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// tag -> keys whose entry carries the tag
    tag_index: HashMap<String, HashSet<K>>,
    next_tick: u64,
}

impl<K: Eq + Hash + Clone, V> CacheInner<K, V> {
    fn tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.dependencies {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn least_recently_used(&self) -> Option<K> {
        self.entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_accessed, entry.access_tick))
            .map(|(key, _)| key.clone())
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

type Resolver = Box<dyn FnOnce() -> Dependencies + Send>;

/// A deferred cache fill for [`DependencyCache::warm_cache_batch`].
pub struct WarmTask<K, V> {
    pub key: K,
    pub ttl: Duration,
    pub dependencies: Dependencies,
    fetcher: BoxFuture<'static, Result<V>>,
    resolver: Option<Resolver>,
}

impl<K, V> WarmTask<K, V> {
    pub fn new<F>(key: K, ttl: Duration, dependencies: Dependencies, fetcher: F) -> Self
    where
        F: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            key,
            ttl,
            dependencies,
            fetcher: Box::pin(fetcher),
            resolver: None,
        }
    }

    /// Compute the stored dependency set once the fetch has succeeded,
    /// replacing the one given to [`WarmTask::new`].
    pub fn resolve_dependencies_with<R>(mut self, resolver: R) -> Self
    where
        R: FnOnce() -> Dependencies + Send + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }
}

/// Outcome of a batch warm.
#[derive(Debug, Default)]
pub struct WarmReport {
    /// Number of entries stored.
    pub warmed: usize,
    /// Rendered key and error of each failed fetch.
    pub failed: Vec<(String, ProgressError)>,
}

impl WarmReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Bounded TTL cache keyed by `K` with dependency tags.
///
/// All operations are synchronous behind one mutex; the only async surface is
/// warming, which awaits the fetcher before taking the lock.
pub struct DependencyCache<K, V> {
    inner: Mutex<CacheInner<K, V>>,
    counters: Counters,
    config: CacheConfig,
    clock: SharedClock,
}

impl<K, V> DependencyCache<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone,
{
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tag_index: HashMap::new(),
                next_tick: 0,
            }),
            counters: Counters::default(),
            config,
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up `key`, requiring the stored dependency set to equal `dependencies`.
    ///
    /// Expired entries and entries stored under different dependencies are
    /// removed and reported as a miss.
    pub fn get(&self, key: &K, dependencies: &Dependencies) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let state = match inner.entries.get(key) {
            None => None,
            Some(entry) if entry.is_expired(now) => Some(false),
            Some(entry) if &entry.dependencies != dependencies => Some(false),
            Some(_) => Some(true),
        };

        match state {
            None => {
                Counters::bump(&self.counters.misses, 1);
                None
            }
            Some(false) => {
                if let Some(entry) = inner.remove(key) {
                    if entry.is_expired(now) {
                        Counters::bump(&self.counters.expirations, 1);
                        debug!("Cache entry {} expired", key);
                    } else {
                        Counters::bump(&self.counters.invalidations, 1);
                        debug!("Cache entry {} dropped: dependency mismatch", key);
                    }
                }
                Counters::bump(&self.counters.misses, 1);
                None
            }
            Some(true) => {
                let tick = inner.tick();
                let entry = inner.entries.get_mut(key)?;
                entry.access_count += 1;
                entry.last_accessed = now;
                entry.access_tick = tick;
                Counters::bump(&self.counters.hits, 1);
                Some(entry.data.clone())
            }
        }
    }

    /// Store `data` under `key`, evicting the least recently used entry when
    /// a new key would exceed capacity.
    pub fn set(&self, key: K, data: V, ttl: Duration, dependencies: Dependencies) {
        let now = self.clock.now();
        let mut inner = self.lock();

        inner.remove(&key);

        if inner.entries.len() >= self.config.capacity {
            let expired: Vec<K> = inner
                .entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect();
            for stale in &expired {
                inner.remove(stale);
            }
            Counters::bump(&self.counters.expirations, expired.len() as u64);
        }

        while inner.entries.len() >= self.config.capacity {
            let Some(victim) = inner.least_recently_used() else {
                break;
            };
            inner.remove(&victim);
            Counters::bump(&self.counters.evictions, 1);
            debug!("Evicted least recently used cache entry {}", victim);
        }

        for tag in &dependencies {
            inner
                .tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        let tick = inner.tick();
        inner.entries.insert(
            key,
            CacheEntry {
                data,
                timestamp: now,
                dependencies,
                access_count: 0,
                last_accessed: now,
                ttl,
                access_tick: tick,
            },
        );
    }

    /// Store with the configured default TTL.
    pub fn set_default(&self, key: K, data: V, dependencies: Dependencies) {
        self.set(key, data, self.config.default_ttl, dependencies);
    }

    /// Snapshot of an entry without touching its recency.
    pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        self.lock().entries.get(key).cloned()
    }

    /// Remove one key; returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            Counters::bump(&self.counters.invalidations, 1);
        }
        removed
    }

    /// Remove every entry whose dependencies contain `tag`.
    pub fn invalidate_by_dependency(&self, tag: &str) -> usize {
        let mut inner = self.lock();
        let Some(keys) = inner.tag_index.remove(tag) else {
            return 0;
        };
        let mut removed = 0;
        for key in keys {
            if inner.remove(&key).is_some() {
                removed += 1;
            }
        }
        drop(inner);

        Counters::bump(&self.counters.invalidations, removed as u64);
        if removed > 0 {
            debug!("Invalidated {} cache entries depending on {}", removed, tag);
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.tag_index.clear();
        Counters::bump(&self.counters.invalidations, count as u64);
    }

    /// Purge expired entries; returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let expired: Vec<K> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        drop(inner);

        Counters::bump(&self.counters.expirations, expired.len() as u64);
        if !expired.is_empty() {
            debug!("Cleaned up {} expired cache entries", expired.len());
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.config.capacity,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Run `fetcher` and store its value.
    ///
    /// A failing fetcher is logged and leaves the cache untouched; returns
    /// whether an entry was stored.
    pub async fn warm_cache<F, Fut>(
        &self,
        key: K,
        fetcher: F,
        ttl: Duration,
        dependencies: Dependencies,
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        match fetcher().await {
            Ok(data) => {
                self.set(key, data, ttl, dependencies);
                true
            }
            Err(e) => {
                warn!("Failed to warm cache entry {}: {}", key, e);
                false
            }
        }
    }

    /// Run every task concurrently; one failure does not stop the others.
    pub async fn warm_cache_batch(&self, tasks: Vec<WarmTask<K, V>>) -> WarmReport {
        let outcomes = join_all(tasks.into_iter().map(|task| async move {
            let WarmTask {
                key,
                ttl,
                dependencies,
                fetcher,
                resolver,
            } = task;
            let outcome = fetcher.await;
            let dependencies = match (&outcome, resolver) {
                (Ok(_), Some(resolve)) => resolve(),
                _ => dependencies,
            };
            (key, ttl, dependencies, outcome)
        }))
        .await;

        let mut report = WarmReport::default();
        for (key, ttl, dependencies, outcome) in outcomes {
            match outcome {
                Ok(data) => {
                    self.set(key, data, ttl, dependencies);
                    report.warmed += 1;
                }
                Err(e) => {
                    warn!("Failed to warm cache entry {}: {}", key, e);
                    report.failed.push((key.to_string(), e));
                }
            }
        }
        report
    }
}

impl<K, V> InvalidationSink for DependencyCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send,
    V: Clone + Send,
{
    fn invalidate_tag(&self, tag: &str) -> usize {
        self.invalidate_by_dependency(tag)
    }

    fn invalidate_all(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::{dependencies, tags};
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn cache(capacity: usize) -> (DependencyCache<String, u32>, ManualClock) {
        let clock = ManualClock::default();
        let config = CacheConfig::default().with_capacity(capacity);
        (DependencyCache::new(config, Arc::new(clock.clone())), clock)
    }

    fn deps() -> Dependencies {
        dependencies([tags::COURSES, "user:u1"])
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = cache(10);
        cache.set("k".into(), 7, Duration::from_secs(60), deps());

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"k".into(), &deps()), Some(7));

        let entry = cache.peek(&"k".into()).unwrap();
        assert_eq!(entry.access_count, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_expires_at_ttl_boundary() {
        let (cache, clock) = cache(10);
        cache.set("k".into(), 7, Duration::from_secs(60), deps());

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get(&"k".into(), &deps()), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_dependency_mismatch_is_a_miss() {
        let (cache, _clock) = cache(10);
        cache.set("k".into(), 7, Duration::from_secs(60), deps());

        let other = dependencies([tags::COURSES]);
        assert_eq!(cache.get(&"k".into(), &other), None);
        // The mismatched entry was dropped, so the original deps miss too.
        assert_eq!(cache.get(&"k".into(), &deps()), None);
    }

    #[test]
    fn test_invalidate_by_dependency() {
        let (cache, _clock) = cache(10);
        let ttl = Duration::from_secs(60);
        cache.set("a".into(), 1, ttl, dependencies([tags::COURSES, "user:u1"]));
        cache.set("b".into(), 2, ttl, dependencies([tags::COURSES, "user:u2"]));
        cache.set("c".into(), 3, ttl, dependencies([tags::PROGRESS]));

        assert_eq!(cache.invalidate_by_dependency("user:u1"), 1);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate_by_dependency(tags::COURSES), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.invalidate_by_dependency("nothing"), 0);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_overwrite_reindexes_tags() {
        let (cache, _clock) = cache(10);
        let ttl = Duration::from_secs(60);
        cache.set("a".into(), 1, ttl, dependencies(["old"]));
        cache.set("a".into(), 2, ttl, dependencies(["new"]));

        assert_eq!(cache.invalidate_by_dependency("old"), 0);
        assert_eq!(cache.invalidate_by_dependency("new"), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let (cache, clock) = cache(100);
        let ttl = Duration::from_secs(3600);
        for i in 0..100 {
            cache.set(format!("k{i}"), i, ttl, deps());
            clock.advance(Duration::from_millis(10));
        }
        // Touch the oldest so k1 becomes the LRU.
        assert_eq!(cache.get(&"k0".into(), &deps()), Some(0));

        cache.set("k100".into(), 100, ttl, deps());
        assert_eq!(cache.len(), 100);
        assert!(cache.peek(&"k1".into()).is_none());
        assert!(cache.peek(&"k0".into()).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_at_capacity_does_not_evict() {
        let (cache, _clock) = cache(2);
        let ttl = Duration::from_secs(60);
        cache.set("a".into(), 1, ttl, deps());
        cache.set("b".into(), 2, ttl, deps());
        cache.set("a".into(), 3, ttl, deps());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let (cache, clock) = cache(10);
        cache.set("short".into(), 1, Duration::from_secs(10), deps());
        cache.set("long".into(), 2, Duration::from_secs(100), deps());

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.peek(&"long".into()).is_some());
    }

    #[tokio::test]
    async fn test_warm_cache_failure_leaves_cache_untouched() {
        let (cache, _clock) = cache(10);
        let ttl = Duration::from_secs(60);

        let stored = cache
            .warm_cache("ok".into(), || async { Ok(5) }, ttl, deps())
            .await;
        assert!(stored);

        let stored = cache
            .warm_cache(
                "bad".into(),
                || async { Err(ProgressError::backend("profiles", "boom")) },
                ttl,
                deps(),
            )
            .await;
        assert!(!stored);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_warm_cache_batch_partial_failure() {
        let (cache, _clock) = cache(10);
        let ttl = Duration::from_secs(60);
        let tasks = vec![
            WarmTask::new("a".to_string(), ttl, deps(), async { Ok(1) }),
            WarmTask::new("b".to_string(), ttl, deps(), async {
                Err(ProgressError::backend("course_units", "down"))
            }),
            WarmTask::new("c".to_string(), ttl, deps(), async { Ok(3) }),
        ];

        let report = cache.warm_cache_batch(tasks).await;
        assert_eq!(report.warmed, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert!(!report.is_complete());
        assert_eq!(cache.get(&"c".into(), &deps()), Some(3));
    }

    #[tokio::test]
    async fn test_warm_task_resolves_dependencies_after_fetch() {
        let (cache, _clock) = cache(10);
        let ttl = Duration::from_secs(60);
        let resolved = dependencies([tags::TEAMS, "team:t1", "user:u1"]);
        let expected = resolved.clone();
        let tasks = vec![
            WarmTask::new("t1".to_string(), ttl, dependencies(["team:t1"]), async { Ok(7) })
                .resolve_dependencies_with(move || resolved),
            WarmTask::new("t2".to_string(), ttl, dependencies(["team:t2"]), async {
                Err(ProgressError::backend("team_memberships", "down"))
            })
            .resolve_dependencies_with(|| unreachable!("resolver runs only after success")),
        ];

        let report = cache.warm_cache_batch(tasks).await;
        assert_eq!(report.warmed, 1);
        assert_eq!(cache.get(&"t1".into(), &expected), Some(7));
        assert_eq!(cache.invalidate_by_dependency("user:u1"), 1);
    }

    #[test]
    fn test_sink_invalidates_by_tag() {
        let (cache, _clock) = cache(10);
        cache.set("a".into(), 1, Duration::from_secs(60), deps());
        let sink: &dyn InvalidationSink = &cache;
        assert_eq!(sink.invalidate_tag("user:u1"), 1);
        sink.invalidate_all();
        assert!(cache.is_empty());
    }
}
