//! Secondary analytics over cached store entries.
//!
//! These never fetch. When the underlying entry has not been loaded they
//! return `None` and leave fetching to the caller.

use super::ProgressEngine;
use crate::calculation::{
    learning_analytics, user_overall_stats, LearningAnalytics, UserOverallStats,
};
use crate::rollup::{team_performance_metrics, TeamPerformanceMetrics};

impl ProgressEngine {
    pub fn calculate_user_overall_stats(&self, user_id: &str) -> Option<UserOverallStats> {
        let courses = self.get_course_progress(user_id)?;
        Some(user_overall_stats(user_id, &courses))
    }

    pub fn calculate_team_performance_metrics(
        &self,
        team_id: &str,
    ) -> Option<TeamPerformanceMetrics> {
        let team = self.get_team_progress(team_id)?;
        Some(team_performance_metrics(&team, &self.config().rollup))
    }

    /// Velocity and time-to-finish from cached course and unit progress.
    pub fn calculate_learning_analytics(&self, user_id: &str) -> Option<LearningAnalytics> {
        let snapshot = self.snapshot();
        let courses = snapshot.course_progress(user_id)?;
        let units = snapshot.unit_progress_for_user(user_id);
        Some(learning_analytics(
            user_id,
            &courses,
            &units,
            self.config().analytics_window,
            self.clock().now(),
        ))
    }
}
