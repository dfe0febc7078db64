//! Row shapes returned by the backend.
//!
//! These mirror the joined projections the engine asks for; they are inputs to
//! derivation and are never cached as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::progress::{CourseProgress, UnitProgress};

/// A unit together with the target user's completion records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitNode {
    pub unit_id: String,
    /// Unit-progress rows, normally filtered to one user by the backend.
    #[serde(default)]
    pub progress: Vec<UnitProgress>,
}

impl UnitNode {
    /// A unit counts as done for `user_id` when one of that user's records
    /// says so. Rows of other users are ignored.
    pub fn is_completed_by(&self, user_id: &str) -> bool {
        self.progress
            .iter()
            .any(|p| p.completed && p.user_id == user_id)
    }
}

/// A lesson and its units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonNode {
    pub lesson_id: String,
    #[serde(default)]
    pub units: Vec<UnitNode>,
}

/// Course progress joined with lessons, units and unit progress in one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgressTree {
    pub progress: CourseProgress,
    #[serde(default)]
    pub lessons: Vec<LessonNode>,
}

impl CourseProgressTree {
    /// Flatten the nested unit-progress rows for this course.
    pub fn unit_progress(&self) -> Vec<UnitProgress> {
        self.lessons
            .iter()
            .flat_map(|lesson| lesson.units.iter())
            .flat_map(|unit| unit.progress.iter().cloned())
            .collect()
    }
}

/// Membership of a user in a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    pub team_id: String,
    pub user_id: String,
    pub role: Option<String>,
}

/// Profile fields needed for rollups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
}

/// A course assigned to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseAssignment {
    pub user_id: String,
    pub course_id: String,
    pub assigned_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

/// Structured payload returned by server-side bulk procedures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureResult {
    pub success: bool,
    #[serde(default)]
    pub records_updated: u64,
    #[serde(default)]
    pub users_affected: u64,
    #[serde(default)]
    pub errors: Vec<String>,
}
