//! Progress state store.
//!
//! A single-writer store: every mutation goes through [`ProgressStore::dispatch`]
//! with a [`StoreCommand`], which swaps in a new immutable [`ProgressState`].
//! Readers take an `Arc` snapshot and never observe a half-applied command.

mod command;
mod reducer;
mod state;

pub use command::StoreCommand;
pub use reducer::reduce;
pub use state::ProgressState;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::trace;

use crate::cache::CacheKey;
use crate::clock::SharedClock;
use crate::models::{CourseCalculation, CourseProgress, TeamProgress, UnitProgress};

/// Holder of the current snapshot.
pub struct ProgressStore {
    state: RwLock<Arc<ProgressState>>,
    clock: SharedClock,
    ttl: Duration,
}

impl ProgressStore {
    pub fn new(clock: SharedClock, ttl: Duration) -> Self {
        Self {
            state: RwLock::new(Arc::new(ProgressState::default())),
            clock,
            ttl,
        }
    }

    /// Apply a command and return the resulting snapshot.
    pub fn dispatch(&self, command: StoreCommand) -> Arc<ProgressState> {
        let now = self.clock.now();
        let name = command.name();
        let key = command.key();
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(reduce(&guard, command, now));
        *guard = Arc::clone(&next);
        match key {
            Some(key) => {
                trace!("Store applied {} for {} (version {})", name, key, next.version())
            }
            None => trace!("Store applied {} (version {})", name, next.version()),
        }
        next
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<ProgressState> {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `key` was populated within the store TTL.
    pub fn is_fresh(&self, key: &CacheKey) -> bool {
        self.snapshot().is_fresh(key, self.ttl, self.clock.now())
    }

    // Selectors

    pub fn get_course_progress(&self, user_id: &str) -> Option<Arc<Vec<CourseProgress>>> {
        self.snapshot().course_progress(user_id)
    }

    pub fn get_unit_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Option<Arc<Vec<UnitProgress>>> {
        self.snapshot().unit_progress(user_id, course_id)
    }

    pub fn get_team_progress(&self, team_id: &str) -> Option<Arc<TeamProgress>> {
        self.snapshot().team_progress(team_id)
    }

    pub fn get_calculation(&self, key: &CacheKey) -> Option<CourseCalculation> {
        self.snapshot().calculation(key)
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        self.snapshot().is_loading(key)
    }

    pub fn get_error(&self, key: &CacheKey) -> Option<String> {
        self.snapshot().error(key).map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InvalidationScope;
    use crate::clock::ManualClock;

    fn store() -> (ProgressStore, ManualClock) {
        let clock = ManualClock::default();
        (
            ProgressStore::new(Arc::new(clock.clone()), Duration::from_secs(300)),
            clock,
        )
    }

    #[test]
    fn test_dispatch_swaps_snapshot() {
        let (store, _clock) = store();
        let before = store.snapshot();

        let after = store.dispatch(StoreCommand::SetCourseProgress {
            user_id: "u1".into(),
            progress: vec![CourseProgress::new("u1", "c1", 50)],
        });

        assert!(before.course_progress("u1").is_none());
        assert_eq!(after.version(), before.version() + 1);
        assert_eq!(store.get_course_progress("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_freshness_follows_clock() {
        let (store, clock) = store();
        store.dispatch(StoreCommand::SetUnitProgress {
            user_id: "u1".into(),
            course_id: "c1".into(),
            progress: vec![],
        });
        let key = CacheKey::unit("u1", "c1");
        assert!(store.is_fresh(&key));

        clock.advance(Duration::from_secs(301));
        assert!(!store.is_fresh(&key));
        assert!(store.get_unit_progress("u1", "c1").is_some());
    }

    #[test]
    fn test_pattern_invalidation() {
        let (store, _clock) = store();
        store.dispatch(StoreCommand::SetCourseProgress {
            user_id: "u1".into(),
            progress: vec![],
        });
        store.dispatch(StoreCommand::InvalidateCache {
            scope: InvalidationScope::Pattern("course-".into()),
        });
        assert!(!store.is_fresh(&CacheKey::course("u1")));
        assert!(store.get_course_progress("u1").is_some());
    }

    #[test]
    fn test_error_selector() {
        let (store, _clock) = store();
        let key = CacheKey::team("t1");
        store.dispatch(StoreCommand::SetError {
            key: key.clone(),
            message: "backend down".into(),
        });
        assert_eq!(store.get_error(&key).as_deref(), Some("backend down"));
        assert!(!store.is_loading(&key));

        store.dispatch(StoreCommand::SetLoading {
            key: key.clone(),
            loading: true,
        });
        assert!(store.get_error(&key).is_none());
        assert!(store.is_loading(&key));
    }
}
