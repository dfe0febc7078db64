//! In-flight fetch sharing.
//!
//! Concurrent callers asking for the same key await one shared future instead
//! of issuing duplicate backend queries. The future unregisters itself when it
//! completes, so the next caller after completion starts a fresh fetch.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::cache::CacheKey;
use crate::error::Result;

pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<()>>>;

#[derive(Default)]
pub(crate) struct InFlight {
    fetches: Mutex<HashMap<CacheKey, SharedFetch>>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, SharedFetch>> {
        self.fetches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the fetch running for `key`, or start `work` and register it.
    pub(crate) fn join_or_start(
        self: &Arc<Self>,
        key: CacheKey,
        work: BoxFuture<'static, Result<()>>,
    ) -> SharedFetch {
        let mut fetches = self.lock();
        if let Some(existing) = fetches.get(&key) {
            debug!("Joining in-flight fetch for {}", key);
            return existing.clone();
        }

        let registry = Arc::downgrade(self);
        let cleanup_key = key.clone();
        let shared = async move {
            let result = work.await;
            if let Some(registry) = registry.upgrade() {
                registry.lock().remove(&cleanup_key);
            }
            result
        }
        .boxed()
        .shared();

        fetches.insert(key, shared.clone());
        shared
    }

    pub(crate) fn is_running(&self, key: &CacheKey) -> bool {
        self.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProgressError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn ok() -> BoxFuture<'static, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn counted(runs: Arc<AtomicUsize>) -> BoxFuture<'static, Result<()>> {
        async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_run() {
        let inflight = Arc::new(InFlight::default());
        let runs = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::course("u1");

        let a = inflight.join_or_start(key.clone(), counted(runs.clone()));
        let b = inflight.join_or_start(key.clone(), counted(runs.clone()));
        assert!(inflight.is_running(&key));

        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!inflight.is_running(&key));
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let inflight = Arc::new(InFlight::default());
        let key = CacheKey::team("t1");
        let failing: BoxFuture<'static, Result<()>> =
            async { Err(ProgressError::Other("down".into())) }.boxed();

        let first = inflight.join_or_start(key.clone(), failing);
        let second = inflight.join_or_start(key.clone(), ok());

        assert!(first.await.is_err());
        assert!(second.await.is_err());

        // The completed fetch unregistered itself, so this one runs.
        let third = inflight.join_or_start(key, ok());
        assert!(third.await.is_ok());
    }
}
