//! Immutable progress snapshot.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CacheKey;
use crate::clock::elapsed;
use crate::models::{CourseCalculation, CourseProgress, TeamProgress, UnitProgress};

/// One version of the progress state.
///
/// Collections are wrapped in `Arc` so cloning a snapshot for the next
/// command is cheap and readers can keep an old snapshot while the store
/// moves on.
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    pub(crate) course_progress: HashMap<String, Arc<Vec<CourseProgress>>>,
    pub(crate) unit_progress: HashMap<(String, String), Arc<Vec<UnitProgress>>>,
    pub(crate) team_progress: HashMap<String, Arc<TeamProgress>>,
    pub(crate) calculations: HashMap<(String, String), CourseCalculation>,
    pub(crate) loading: HashSet<CacheKey>,
    pub(crate) errors: HashMap<CacheKey, String>,
    pub(crate) last_updated: HashMap<CacheKey, DateTime<Utc>>,
    pub(crate) version: u64,
}

impl ProgressState {
    pub fn course_progress(&self, user_id: &str) -> Option<Arc<Vec<CourseProgress>>> {
        self.course_progress.get(user_id).cloned()
    }

    pub fn unit_progress(&self, user_id: &str, course_id: &str) -> Option<Arc<Vec<UnitProgress>>> {
        self.unit_progress
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned()
    }

    /// All cached unit progress of a user, across courses.
    pub fn unit_progress_for_user(&self, user_id: &str) -> Vec<UnitProgress> {
        self.unit_progress
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    pub fn team_progress(&self, team_id: &str) -> Option<Arc<TeamProgress>> {
        self.team_progress.get(team_id).cloned()
    }

    /// Calculation stored under a `Calculation` key; other key kinds yield `None`.
    pub fn calculation(&self, key: &CacheKey) -> Option<CourseCalculation> {
        match key {
            CacheKey::Calculation { user_id, course_id } => self
                .calculations
                .get(&(user_id.clone(), course_id.clone()))
                .cloned(),
            _ => None,
        }
    }

    pub fn is_loading(&self, key: &CacheKey) -> bool {
        self.loading.contains(key)
    }

    pub fn error(&self, key: &CacheKey) -> Option<&str> {
        self.errors.get(key).map(String::as_str)
    }

    pub fn last_updated(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        self.last_updated.get(key).copied()
    }

    /// Whether `key` was populated less than `ttl` before `now`.
    pub fn is_fresh(&self, key: &CacheKey, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.last_updated
            .get(key)
            .is_some_and(|at| elapsed(*at, now) < ttl)
    }

    /// Number of commands applied to reach this snapshot.
    pub fn version(&self) -> u64 {
        self.version
    }
}
