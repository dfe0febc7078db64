//! In-memory implementation of the backend contract.
//!
//! Holds courses, progress rows, teams and assignments in ordered maps and
//! answers the same joined queries a relational backend would. Tests use the
//! fault, conflict and latency hooks to drive error paths, and the call
//! counters to assert how many round trips an action made.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::{ops, procedures, ProgressBackend};
use crate::calculation::{completion_percentage, count_units};
use crate::error::{ProgressError, Result};
use crate::models::{
    CourseAssignment, CourseProgress, CourseProgressTree, LessonNode, ProcedureResult, Profile,
    TeamMembership, UnitNode, UnitProgress,
};

#[derive(Debug, Default)]
struct Tables {
    /// course id -> ordered lessons of (lesson id, unit ids)
    courses: BTreeMap<String, Vec<(String, Vec<String>)>>,
    /// (user, unit) -> row
    unit_progress: BTreeMap<(String, String), UnitProgress>,
    /// (user, course) -> row
    course_progress: BTreeMap<(String, String), CourseProgress>,
    memberships: Vec<TeamMembership>,
    profiles: BTreeMap<String, Profile>,
    assignments: Vec<CourseAssignment>,
}

impl Tables {
    fn lessons_for(&self, user_id: &str, course_id: &str) -> Vec<LessonNode> {
        let Some(lessons) = self.courses.get(course_id) else {
            return Vec::new();
        };
        lessons
            .iter()
            .map(|(lesson_id, unit_ids)| LessonNode {
                lesson_id: lesson_id.clone(),
                units: unit_ids
                    .iter()
                    .map(|unit_id| UnitNode {
                        unit_id: unit_id.clone(),
                        progress: self
                            .unit_progress
                            .get(&(user_id.to_string(), unit_id.clone()))
                            .filter(|row| row.course_id == course_id)
                            .cloned()
                            .into_iter()
                            .collect(),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Every (user, course) pair that has either a course row or unit rows.
    fn progress_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self.course_progress.keys().cloned().collect();
        pairs.extend(
            self.unit_progress
                .values()
                .map(|row| (row.user_id.clone(), row.course_id.clone())),
        );
        pairs.sort();
        pairs.dedup();
        pairs
    }

    fn computed_percentage(&self, user_id: &str, course_id: &str) -> u8 {
        let (total, completed) = count_units(&self.lessons_for(user_id, course_id), user_id);
        completion_percentage(completed, total)
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// op -> remaining failures (`usize::MAX` = always)
    failures: HashMap<&'static str, usize>,
    /// op -> remaining conflicts
    conflicts: HashMap<&'static str, usize>,
    latency: HashMap<&'static str, Duration>,
}

/// In-memory backend with fault injection.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    tables: Mutex<Tables>,
    faults: Mutex<Faults>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // Seeding

    /// Register a course as an ordered list of `(lesson id, unit ids)`.
    pub fn add_course(&self, course_id: &str, lessons: &[(&str, &[&str])]) {
        let lessons = lessons
            .iter()
            .map(|(lesson, units)| {
                (
                    lesson.to_string(),
                    units.iter().map(|u| u.to_string()).collect(),
                )
            })
            .collect();
        lock(&self.tables)
            .courses
            .insert(course_id.to_string(), lessons);
    }

    /// Store a unit progress row as-is.
    pub fn put_unit_progress(&self, record: UnitProgress) {
        lock(&self.tables)
            .unit_progress
            .insert((record.user_id.clone(), record.unit_id.clone()), record);
    }

    /// Store a course progress row as-is.
    pub fn put_course_progress(&self, record: CourseProgress) {
        lock(&self.tables)
            .course_progress
            .insert((record.user_id.clone(), record.course_id.clone()), record);
    }

    /// Add a user to a team and record their profile.
    pub fn add_team_member(&self, team_id: &str, user_id: &str, email: &str, name: Option<&str>) {
        let mut tables = lock(&self.tables);
        tables.memberships.push(TeamMembership {
            team_id: team_id.to_string(),
            user_id: user_id.to_string(),
            role: None,
        });
        tables.profiles.insert(
            user_id.to_string(),
            Profile {
                user_id: user_id.to_string(),
                email: email.to_string(),
                full_name: name.map(String::from),
            },
        );
    }

    pub fn assign_course(&self, user_id: &str, course_id: &str) {
        lock(&self.tables).assignments.push(CourseAssignment {
            user_id: user_id.to_string(),
            course_id: course_id.to_string(),
            assigned_at: None,
            due_at: None,
        });
    }

    // Inspection

    pub fn stored_unit_progress(&self, user_id: &str, unit_id: &str) -> Option<UnitProgress> {
        lock(&self.tables)
            .unit_progress
            .get(&(user_id.to_string(), unit_id.to_string()))
            .cloned()
    }

    pub fn stored_course_progress(&self, user_id: &str, course_id: &str) -> Option<CourseProgress> {
        lock(&self.tables)
            .course_progress
            .get(&(user_id.to_string(), course_id.to_string()))
            .cloned()
    }

    /// Number of times `op` was invoked.
    pub fn call_count(&self, op: &str) -> usize {
        lock(&self.calls).get(op).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    // Fault injection

    /// Fail the next `times` invocations of `op` with a backend error.
    pub fn fail_next(&self, op: &'static str, times: usize) {
        lock(&self.faults).failures.insert(op, times);
    }

    /// Fail every invocation of `op` until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, op: &'static str) {
        lock(&self.faults).failures.insert(op, usize::MAX);
    }

    /// Report a write conflict for the next `times` invocations of `op`.
    pub fn conflict_next(&self, op: &'static str, times: usize) {
        lock(&self.faults).conflicts.insert(op, times);
    }

    /// Delay every invocation of `op`.
    pub fn set_latency(&self, op: &'static str, latency: Duration) {
        lock(&self.faults).latency.insert(op, latency);
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = Faults::default();
    }

    /// Count the call, apply latency, then surface any injected fault.
    async fn enter(&self, op: &'static str) -> Result<()> {
        *lock(&self.calls).entry(op).or_insert(0) += 1;

        let latency = lock(&self.faults).latency.get(op).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = lock(&self.faults);
        if let Some(remaining) = faults.failures.get_mut(op) {
            if *remaining > 0 {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                return Err(ProgressError::backend(op, "injected failure"));
            }
        }
        if let Some(remaining) = faults.conflicts.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProgressError::conflict(op, "duplicate key value"));
            }
        }
        Ok(())
    }

    fn recalculate_all(&self) -> ProcedureResult {
        let mut tables = lock(&self.tables);
        let mut updated = 0u64;
        let mut users = HashSet::new();

        for (user_id, course_id) in tables.progress_pairs() {
            let percentage = tables.computed_percentage(&user_id, &course_id);
            let key = (user_id.clone(), course_id.clone());
            let existing = tables.course_progress.get(&key).cloned();
            if existing
                .as_ref()
                .is_some_and(|row| row.progress_percentage == percentage && row.is_consistent())
            {
                continue;
            }
            let mut row = CourseProgress::new(user_id.clone(), course_id.clone(), percentage);
            if let Some(previous) = existing {
                row.last_accessed_at = previous.last_accessed_at;
                row.completed_at = previous.completed_at.filter(|_| percentage == 100);
            }
            tables.course_progress.insert(key, row);
            updated += 1;
            users.insert(user_id);
        }

        ProcedureResult {
            success: true,
            records_updated: updated,
            users_affected: users.len() as u64,
            errors: Vec::new(),
        }
    }

    fn diagnose(&self) -> ProcedureResult {
        let tables = lock(&self.tables);
        let mut errors = Vec::new();
        let mut users = HashSet::new();

        for ((user_id, course_id), row) in &tables.course_progress {
            let expected = tables.computed_percentage(user_id, course_id);
            if !row.is_consistent() {
                errors.push(format!(
                    "{user_id}/{course_id}: status {} does not match {}%",
                    row.status, row.progress_percentage
                ));
                users.insert(user_id.clone());
            } else if row.progress_percentage != expected {
                errors.push(format!(
                    "{user_id}/{course_id}: stored {}% but units give {}%",
                    row.progress_percentage, expected
                ));
                users.insert(user_id.clone());
            }
        }

        ProcedureResult {
            success: true,
            records_updated: 0,
            users_affected: users.len() as u64,
            errors,
        }
    }
}

#[async_trait]
impl ProgressBackend for InMemoryBackend {
    async fn course_progress_tree(&self, user_id: &str) -> Result<Vec<CourseProgressTree>> {
        self.enter(ops::COURSE_PROGRESS_TREE).await?;
        let tables = lock(&self.tables);
        Ok(tables
            .course_progress
            .values()
            .filter(|row| row.user_id == user_id)
            .map(|row| CourseProgressTree {
                progress: row.clone(),
                lessons: tables.lessons_for(user_id, &row.course_id),
            })
            .collect())
    }

    async fn course_units(&self, user_id: &str, course_id: &str) -> Result<Vec<LessonNode>> {
        self.enter(ops::COURSE_UNITS).await?;
        Ok(lock(&self.tables).lessons_for(user_id, course_id))
    }

    async fn unit_progress(&self, user_id: &str, course_id: &str) -> Result<Vec<UnitProgress>> {
        self.enter(ops::UNIT_PROGRESS).await?;
        Ok(lock(&self.tables)
            .unit_progress
            .values()
            .filter(|row| row.user_id == user_id && row.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn team_memberships(&self, team_id: &str) -> Result<Vec<TeamMembership>> {
        self.enter(ops::TEAM_MEMBERSHIPS).await?;
        Ok(lock(&self.tables)
            .memberships
            .iter()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn profiles(&self, user_ids: &[String]) -> Result<Vec<Profile>> {
        self.enter(ops::PROFILES).await?;
        let tables = lock(&self.tables);
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }

    async fn course_assignments(&self, user_ids: &[String]) -> Result<Vec<CourseAssignment>> {
        self.enter(ops::COURSE_ASSIGNMENTS).await?;
        let wanted: HashSet<&String> = user_ids.iter().collect();
        Ok(lock(&self.tables)
            .assignments
            .iter()
            .filter(|a| wanted.contains(&a.user_id))
            .cloned()
            .collect())
    }

    async fn course_progress_for_users(&self, user_ids: &[String]) -> Result<Vec<CourseProgress>> {
        self.enter(ops::COURSE_PROGRESS_FOR_USERS).await?;
        let wanted: HashSet<&String> = user_ids.iter().collect();
        Ok(lock(&self.tables)
            .course_progress
            .values()
            .filter(|row| wanted.contains(&row.user_id))
            .cloned()
            .collect())
    }

    async fn upsert_unit_progress(&self, record: &UnitProgress) -> Result<()> {
        self.enter(ops::UPSERT_UNIT_PROGRESS).await?;
        self.put_unit_progress(record.clone());
        Ok(())
    }

    async fn update_unit_progress(&self, record: &UnitProgress) -> Result<()> {
        self.enter(ops::UPDATE_UNIT_PROGRESS).await?;
        self.put_unit_progress(record.clone());
        Ok(())
    }

    async fn upsert_course_progress(&self, record: &CourseProgress) -> Result<()> {
        self.enter(ops::UPSERT_COURSE_PROGRESS).await?;
        self.put_course_progress(record.clone());
        Ok(())
    }

    async fn update_course_progress(&self, record: &CourseProgress) -> Result<()> {
        self.enter(ops::UPDATE_COURSE_PROGRESS).await?;
        self.put_course_progress(record.clone());
        Ok(())
    }

    async fn call_procedure(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ProcedureResult> {
        self.enter(ops::CALL_PROCEDURE).await?;
        debug!("In-memory procedure {} with params {}", name, params);
        match name {
            procedures::RECALCULATE_ALL_PROGRESS => Ok(self.recalculate_all()),
            procedures::DIAGNOSE_PROGRESS => Ok(self.diagnose()),
            other => Err(ProgressError::Procedure {
                name: other.to_string(),
                message: "unknown procedure".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.add_course("c1", &[("l1", &["u-a", "u-b"]), ("l2", &["u-c"])]);
        backend.put_course_progress(CourseProgress::new("alice", "c1", 0));
        backend.put_unit_progress(UnitProgress::new("alice", "c1", "u-a", true, None));
        backend.put_unit_progress(UnitProgress::new("bob", "c1", "u-b", true, None));
        backend
    }

    #[tokio::test]
    async fn test_course_units_filters_to_user() {
        let backend = seeded();
        let lessons = backend.course_units("alice", "c1").await.unwrap();
        assert_eq!(count_units(&lessons, "alice"), (3, 1));

        let missing = backend.course_units("alice", "nope").await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_tree_joins_lessons() {
        let backend = seeded();
        let trees = backend.course_progress_tree("alice").await.unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].lessons.len(), 2);
        assert_eq!(trees[0].unit_progress().len(), 1);
        assert_eq!(backend.call_count(ops::COURSE_PROGRESS_TREE), 1);
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let backend = seeded();
        backend.fail_next(ops::UNIT_PROGRESS, 1);
        assert!(backend.unit_progress("alice", "c1").await.is_err());
        assert!(backend.unit_progress("alice", "c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_conflict_injection() {
        let backend = seeded();
        backend.conflict_next(ops::UPSERT_UNIT_PROGRESS, 1);
        let row = UnitProgress::new("alice", "c1", "u-b", true, None);
        let err = backend.upsert_unit_progress(&row).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(backend.stored_unit_progress("alice", "u-b").is_none());
    }

    #[tokio::test]
    async fn test_recalculate_and_diagnose() {
        let backend = seeded();

        let report = backend
            .call_procedure(procedures::DIAGNOSE_PROGRESS, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(report.errors.len(), 1);

        let result = backend
            .call_procedure(procedures::RECALCULATE_ALL_PROGRESS, serde_json::json!({}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.records_updated, 2);
        assert_eq!(result.users_affected, 2);
        assert_eq!(
            backend
                .stored_course_progress("alice", "c1")
                .unwrap()
                .progress_percentage,
            33
        );

        let report = backend
            .call_procedure(procedures::DIAGNOSE_PROGRESS, serde_json::json!({}))
            .await
            .unwrap();
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let backend = seeded();
        let err = backend
            .call_procedure("drop_everything", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressError::Procedure { .. }));
    }
}
