//! Cached dashboard aggregates.
//!
//! A dashboard combines several analytics over one user or one team. Results
//! live in a [`DependencyCache`] registered with the engine as an
//! [`InvalidationSink`], so a unit write for a user drops that user's
//! dashboard and every team dashboard the user appears in.
//!
//! The dependency set of an entry is derived from the store at lookup time. A
//! team whose membership changed since the dashboard was built therefore
//! misses even before any tag is invalidated.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::{
    dependencies, tags, CacheKey, CacheStats, Dependencies, DependencyCache, SweeperHandle,
    WarmReport, WarmTask,
};
use crate::calculation::{LearningAnalytics, UserOverallStats};
use crate::cancel::CancellationToken;
use crate::engine::ProgressEngine;
use crate::error::{ProgressError, Result};
use crate::models::TeamProgress;
use crate::rollup::TeamPerformanceMetrics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDashboard {
    pub user_id: String,
    pub stats: UserOverallStats,
    pub analytics: LearningAnalytics,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamDashboard {
    pub team_id: String,
    pub metrics: TeamPerformanceMetrics,
    pub generated_at: DateTime<Utc>,
}

/// Cached value.
#[derive(Debug, Clone)]
pub enum DashboardSnapshot {
    User(Arc<UserDashboard>),
    Team(Arc<TeamDashboard>),
}

fn user_dependencies(user_id: &str) -> Dependencies {
    dependencies([
        tags::COURSES.to_string(),
        tags::PROGRESS.to_string(),
        tags::user(user_id),
    ])
}

fn team_dependencies(team_id: &str, team: Option<&TeamProgress>) -> Dependencies {
    let mut deps = dependencies([
        tags::TEAMS.to_string(),
        tags::PROGRESS.to_string(),
        tags::team(team_id),
    ]);
    if let Some(team) = team {
        deps.extend(team.members.iter().map(|m| tags::user(&m.user_id)));
    }
    deps
}

fn not_cached(entity: &str, id: &str) -> ProgressError {
    ProgressError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

/// Dashboard service over a [`ProgressEngine`].
pub struct ProgressDashboard {
    engine: ProgressEngine,
    cache: Arc<DependencyCache<CacheKey, DashboardSnapshot>>,
}

impl ProgressDashboard {
    /// Create the dashboard cache and register it with the engine.
    pub fn new(engine: ProgressEngine) -> Self {
        let cache = Arc::new(DependencyCache::new(
            engine.config().cache.clone(),
            engine.clock(),
        ));
        engine.register_sink(cache.clone());
        Self { engine, cache }
    }

    pub fn cache(&self) -> &Arc<DependencyCache<CacheKey, DashboardSnapshot>> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Start the expiry sweeper for the dashboard cache.
    pub fn spawn_sweeper(&self, token: CancellationToken) -> SweeperHandle {
        self.cache.spawn_sweeper(token)
    }

    #[instrument(skip(self))]
    pub async fn user_dashboard(&self, user_id: &str) -> Result<Arc<UserDashboard>> {
        let key = CacheKey::user_dashboard(user_id);
        let deps = user_dependencies(user_id);
        if let Some(DashboardSnapshot::User(hit)) = self.cache.get(&key, &deps) {
            debug!("Dashboard cache hit for {}", key);
            return Ok(hit);
        }

        let dashboard = Self::build_user(self.engine.clone(), user_id.to_string()).await?;
        self.cache.set_default(
            key,
            DashboardSnapshot::User(Arc::clone(&dashboard)),
            deps,
        );
        Ok(dashboard)
    }

    #[instrument(skip(self))]
    pub async fn team_dashboard(&self, team_id: &str) -> Result<Arc<TeamDashboard>> {
        let key = CacheKey::team_dashboard(team_id);
        let cached_team = self.engine.get_team_progress(team_id);
        let deps = team_dependencies(team_id, cached_team.as_deref());
        if let Some(DashboardSnapshot::Team(hit)) = self.cache.get(&key, &deps) {
            debug!("Dashboard cache hit for {}", key);
            return Ok(hit);
        }

        let dashboard = Self::build_team(self.engine.clone(), team_id.to_string()).await?;
        let team = self.engine.get_team_progress(team_id);
        self.cache.set_default(
            key,
            DashboardSnapshot::Team(Arc::clone(&dashboard)),
            team_dependencies(team_id, team.as_deref()),
        );
        Ok(dashboard)
    }

    /// Build and cache dashboards for the given users and teams concurrently.
    ///
    /// Failures are logged and reported; the remaining dashboards are still
    /// cached.
    pub async fn warm(&self, user_ids: &[String], team_ids: &[String]) -> WarmReport {
        let ttl = self.cache.config().default_ttl;
        let mut tasks = Vec::with_capacity(user_ids.len() + team_ids.len());

        for user_id in user_ids {
            let build = Self::build_user(self.engine.clone(), user_id.clone());
            tasks.push(WarmTask::new(
                CacheKey::user_dashboard(user_id),
                ttl,
                user_dependencies(user_id),
                async move { build.await.map(DashboardSnapshot::User) },
            ));
        }

        // Membership is only known after the fetch
        for team_id in team_ids {
            let build = Self::build_team(self.engine.clone(), team_id.clone());
            let engine = self.engine.clone();
            let team = team_id.clone();
            tasks.push(
                WarmTask::new(
                    CacheKey::team_dashboard(team_id),
                    ttl,
                    team_dependencies(team_id, None),
                    async move { build.await.map(DashboardSnapshot::Team) },
                )
                .resolve_dependencies_with(move || {
                    team_dependencies(&team, engine.get_team_progress(&team).as_deref())
                }),
            );
        }

        self.cache.warm_cache_batch(tasks).await
    }

    async fn build_user(engine: ProgressEngine, user_id: String) -> Result<Arc<UserDashboard>> {
        engine.fetch_course_progress(&user_id, false).await?;
        let stats = engine
            .calculate_user_overall_stats(&user_id)
            .ok_or_else(|| not_cached("course progress", &user_id))?;
        let analytics = engine
            .calculate_learning_analytics(&user_id)
            .ok_or_else(|| not_cached("course progress", &user_id))?;

        Ok(Arc::new(UserDashboard {
            generated_at: engine.clock().now(),
            user_id,
            stats,
            analytics,
        }))
    }

    async fn build_team(engine: ProgressEngine, team_id: String) -> Result<Arc<TeamDashboard>> {
        engine.fetch_team_progress(&team_id, false).await?;
        let metrics = engine
            .calculate_team_performance_metrics(&team_id)
            .ok_or_else(|| not_cached("team progress", &team_id))?;

        Ok(Arc::new(TeamDashboard {
            generated_at: engine.clock().now(),
            team_id,
            metrics,
        }))
    }
}
