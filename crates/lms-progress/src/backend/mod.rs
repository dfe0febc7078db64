//! Backend query/RPC boundary.
//!
//! The engine consumes the hosted relational store through [`ProgressBackend`]
//! and never implements it for production; the application plugs in its own
//! client. [`InMemoryBackend`] implements the same contract for tests and for
//! embedding the engine without a database.

mod memory;

pub use memory::InMemoryBackend;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    CourseAssignment, CourseProgress, CourseProgressTree, LessonNode, ProcedureResult, Profile,
    TeamMembership, UnitProgress,
};

/// Names of server-side bulk procedures.
pub mod procedures {
    /// Recompute every user's course progress from unit records.
    pub const RECALCULATE_ALL_PROGRESS: &str = "recalculate_all_progress";
    /// Report course-progress rows that disagree with their unit records.
    pub const DIAGNOSE_PROGRESS: &str = "diagnose_progress_inconsistencies";
}

/// Operation names, used in error messages and by the in-memory backend's
/// fault injection and call counters.
pub mod ops {
    pub const COURSE_PROGRESS_TREE: &str = "course_progress_tree";
    pub const COURSE_UNITS: &str = "course_units";
    pub const UNIT_PROGRESS: &str = "unit_progress";
    pub const TEAM_MEMBERSHIPS: &str = "team_memberships";
    pub const PROFILES: &str = "profiles";
    pub const COURSE_ASSIGNMENTS: &str = "course_assignments";
    pub const COURSE_PROGRESS_FOR_USERS: &str = "course_progress_for_users";
    pub const UPSERT_UNIT_PROGRESS: &str = "upsert_unit_progress";
    pub const UPDATE_UNIT_PROGRESS: &str = "update_unit_progress";
    pub const UPSERT_COURSE_PROGRESS: &str = "upsert_course_progress";
    pub const UPDATE_COURSE_PROGRESS: &str = "update_course_progress";
    pub const CALL_PROCEDURE: &str = "call_procedure";
}

/// Query and write contract the engine needs from the persistent store.
///
/// Writes are insert-or-update and never delete. An upsert that loses a race
/// reports [`ProgressError::Conflict`](crate::ProgressError::Conflict); the
/// engine then retries with the matching `update_*` call.
#[async_trait]
pub trait ProgressBackend: Send + Sync {
    /// Course progress rows for a user, each joined with its lessons, units and
    /// the user's unit progress, in one round trip.
    async fn course_progress_tree(&self, user_id: &str) -> Result<Vec<CourseProgressTree>>;

    /// Lessons and units of one course with unit progress filtered to the user.
    ///
    /// A course without lessons yields an empty list, not an error.
    async fn course_units(&self, user_id: &str, course_id: &str) -> Result<Vec<LessonNode>>;

    /// Unit progress rows for a (user, course) pair.
    async fn unit_progress(&self, user_id: &str, course_id: &str) -> Result<Vec<UnitProgress>>;

    async fn team_memberships(&self, team_id: &str) -> Result<Vec<TeamMembership>>;

    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>>;

    async fn course_assignments(&self, user_ids: &[String]) -> Result<Vec<CourseAssignment>>;

    async fn course_progress_for_users(&self, user_ids: &[String]) -> Result<Vec<CourseProgress>>;

    /// Insert-or-update keyed by (user, unit, course).
    async fn upsert_unit_progress(&self, record: &UnitProgress) -> Result<()>;

    /// Update an existing unit progress row.
    async fn update_unit_progress(&self, record: &UnitProgress) -> Result<()>;

    /// Insert-or-update keyed by (user, course).
    async fn upsert_course_progress(&self, record: &CourseProgress) -> Result<()>;

    /// Update an existing course progress row.
    async fn update_course_progress(&self, record: &CourseProgress) -> Result<()>;

    /// Invoke a named server-side procedure.
    async fn call_procedure(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ProcedureResult>;
}

/// Shared backend handle.
pub type DynBackend = Arc<dyn ProgressBackend>;
