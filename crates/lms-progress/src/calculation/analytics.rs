//! Per-user secondary analytics.
//!
//! Pure functions over already cached collections. The engine decides whether
//! the inputs exist; nothing here fetches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::elapsed;
use crate::models::{CourseProgress, ProgressStatus, UnitProgress};

const SECONDS_PER_WEEK: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// Course counts and averages for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOverallStats {
    pub user_id: String,
    pub total_courses: usize,
    pub completed_courses: usize,
    pub in_progress_courses: usize,
    pub not_started_courses: usize,
    /// Mean course percentage, rounded half up.
    pub average_progress: u8,
    /// Completed over total courses, 0–100.
    pub completion_rate: f64,
}

/// Completion pace of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningAnalytics {
    pub user_id: String,
    /// Courses completed per week over the analytics window.
    pub velocity_per_week: f64,
    /// Units completed inside the window, from cached unit progress.
    pub units_completed_in_window: usize,
    /// Days to finish the remaining courses at the current velocity.
    ///
    /// `Some(0)` when nothing remains, `None` when velocity is zero.
    pub estimated_days_remaining: Option<u32>,
    pub last_activity: Option<DateTime<Utc>>,
    /// Courses currently in progress.
    pub active_courses: usize,
}

/// Rounded-half-up mean of the percentages; zero for an empty input.
pub(crate) fn mean_percentage<I>(values: I) -> u8
where
    I: IntoIterator<Item = u8>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0u64, 0u64), |(sum, count), v| (sum + v as u64, count + 1));
    if count == 0 {
        return 0;
    }
    ((sum * 2 + count) / (count * 2)) as u8
}

pub fn user_overall_stats(user_id: &str, courses: &[CourseProgress]) -> UserOverallStats {
    let count = |status: ProgressStatus| courses.iter().filter(|c| c.status == status).count();
    let total_courses = courses.len();
    let completed_courses = count(ProgressStatus::Completed);
    let completion_rate = if total_courses == 0 {
        0.0
    } else {
        completed_courses as f64 / total_courses as f64 * 100.0
    };

    UserOverallStats {
        user_id: user_id.to_string(),
        total_courses,
        completed_courses,
        in_progress_courses: count(ProgressStatus::InProgress),
        not_started_courses: count(ProgressStatus::NotStarted),
        average_progress: mean_percentage(courses.iter().map(|c| c.progress_percentage)),
        completion_rate,
    }
}

pub fn learning_analytics(
    user_id: &str,
    courses: &[CourseProgress],
    units: &[UnitProgress],
    window: Duration,
    now: DateTime<Utc>,
) -> LearningAnalytics {
    let in_window = |at: Option<DateTime<Utc>>| at.is_some_and(|at| elapsed(at, now) <= window);

    let completed_in_window = courses
        .iter()
        .filter(|c| c.status == ProgressStatus::Completed && in_window(c.completed_at))
        .count();
    let units_completed_in_window = units
        .iter()
        .filter(|u| u.completed && in_window(u.completed_at))
        .count();

    let weeks = window.as_secs_f64() / SECONDS_PER_WEEK;
    let velocity_per_week = if weeks > 0.0 {
        completed_in_window as f64 / weeks
    } else {
        0.0
    };

    let remaining = courses
        .iter()
        .filter(|c| c.status != ProgressStatus::Completed)
        .count();
    let estimated_days_remaining = if remaining == 0 {
        Some(0)
    } else if velocity_per_week > 0.0 {
        Some((remaining as f64 / velocity_per_week * 7.0).ceil() as u32)
    } else {
        None
    };

    let last_activity = courses
        .iter()
        .flat_map(|c| [c.last_accessed_at, c.completed_at])
        .chain(units.iter().map(|u| u.completed_at))
        .flatten()
        .max();

    LearningAnalytics {
        user_id: user_id.to_string(),
        velocity_per_week,
        units_completed_in_window,
        estimated_days_remaining,
        last_activity,
        active_courses: courses
            .iter()
            .filter(|c| c.status == ProgressStatus::InProgress)
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOUR_WEEKS: Duration = Duration::from_secs(28 * 24 * 60 * 60);

    fn completed(course: &str, at: DateTime<Utc>) -> CourseProgress {
        let mut row = CourseProgress::new("u1", course, 100);
        row.completed_at = Some(at);
        row
    }

    #[test]
    fn test_overall_stats() {
        let courses = vec![
            CourseProgress::new("u1", "a", 100),
            CourseProgress::new("u1", "b", 50),
            CourseProgress::new("u1", "c", 0),
            CourseProgress::new("u1", "d", 25),
        ];
        let stats = user_overall_stats("u1", &courses);
        assert_eq!(stats.total_courses, 4);
        assert_eq!(stats.completed_courses, 1);
        assert_eq!(stats.in_progress_courses, 2);
        assert_eq!(stats.not_started_courses, 1);
        // 175 / 4 = 43.75
        assert_eq!(stats.average_progress, 44);
        assert!((stats.completion_rate - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overall_stats_empty() {
        let stats = user_overall_stats("u1", &[]);
        assert_eq!(stats.total_courses, 0);
        assert_eq!(stats.average_progress, 0);
        assert_eq!(stats.completion_rate, 0.0);
    }

    #[test]
    fn test_velocity_and_estimate() {
        let now = Utc::now();
        let courses = vec![
            completed("a", now - chrono::Duration::days(3)),
            completed("b", now - chrono::Duration::days(10)),
            // Outside the window; does not count toward velocity.
            completed("c", now - chrono::Duration::days(60)),
            CourseProgress::new("u1", "d", 40),
        ];
        let analytics = learning_analytics("u1", &courses, &[], FOUR_WEEKS, now);

        assert!((analytics.velocity_per_week - 0.5).abs() < 1e-9);
        assert_eq!(analytics.estimated_days_remaining, Some(14));
        assert_eq!(analytics.active_courses, 1);
        assert_eq!(analytics.last_activity, Some(now - chrono::Duration::days(3)));
    }

    #[test]
    fn test_no_velocity_means_no_estimate() {
        let now = Utc::now();
        let courses = vec![CourseProgress::new("u1", "a", 10)];
        let analytics = learning_analytics("u1", &courses, &[], FOUR_WEEKS, now);
        assert_eq!(analytics.velocity_per_week, 0.0);
        assert_eq!(analytics.estimated_days_remaining, None);
        assert_eq!(analytics.last_activity, None);
    }

    #[test]
    fn test_units_count_toward_activity() {
        let now = Utc::now();
        let unit_time = now - chrono::Duration::hours(2);
        let units = vec![
            UnitProgress::new("u1", "a", "x", true, Some(unit_time)),
            UnitProgress::new("u1", "a", "y", false, None),
        ];
        let courses = vec![CourseProgress::new("u1", "a", 50)];
        let analytics = learning_analytics("u1", &courses, &units, FOUR_WEEKS, now);
        assert_eq!(analytics.units_completed_in_window, 1);
        assert_eq!(analytics.last_activity, Some(unit_time));
    }

    #[test]
    fn test_all_done_needs_no_days() {
        let now = Utc::now();
        let analytics =
            learning_analytics("u1", &[completed("a", now)], &[], FOUR_WEEKS, now);
        assert_eq!(analytics.estimated_days_remaining, Some(0));
    }
}
