//! Background expiry sweep for dependency caches.

use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::manager::DependencyCache;
use crate::cancel::CancellationToken;

/// Handle to a running sweeper task.
///
/// Dropping the handle stops the sweep. The task only holds a weak reference,
/// so it also ends once the cache itself is dropped.
#[derive(Debug)]
pub struct SweeperHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the sweep and wait for the task to exit.
    pub async fn join(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl<K, V> DependencyCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Start a sweeper at the configured `sweep_interval`.
    pub fn spawn_sweeper(self: &Arc<Self>, token: CancellationToken) -> SweeperHandle {
        spawn_sweeper(self, self.config().sweep_interval, token)
    }
}

/// Spawn a task that calls [`DependencyCache::cleanup_expired`] every `interval`
/// until `token` is cancelled or the handle is dropped.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper<K, V>(
    cache: &Arc<DependencyCache<K, V>>,
    interval: Duration,
    token: CancellationToken,
) -> SweeperHandle
where
    K: Eq + Hash + Clone + Display + Send + 'static,
    V: Clone + Send + 'static,
{
    let weak = Arc::downgrade(cache);
    let task_token = token.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(cache) = weak.upgrade() else {
                        break;
                    };
                    let removed = cache.cleanup_expired();
                    if removed > 0 {
                        info!("Cache sweep removed {} expired entries", removed);
                    }
                }
            }
        }
        debug!("Cache sweeper stopped");
    });

    SweeperHandle {
        token,
        task: Some(task),
    }
}
