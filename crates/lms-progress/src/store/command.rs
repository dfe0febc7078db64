//! Closed set of state mutations.

use crate::cache::{CacheKey, InvalidationScope};
use crate::models::{CourseCalculation, CourseProgress, TeamProgress, UnitProgress};

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Mark a key as loading, or clear the flag.
    SetLoading { key: CacheKey, loading: bool },
    /// Record a failure for a key. Existing data stays in place.
    SetError { key: CacheKey, message: String },
    /// Replace a user's course progress list.
    SetCourseProgress {
        user_id: String,
        progress: Vec<CourseProgress>,
    },
    /// Replace one row of a user's cached course list, appending it when the
    /// course is not listed. Freshness, loading and error stay as they are, and
    /// nothing happens while the user's list has never been fetched.
    PatchCourseProgress { progress: CourseProgress },
    /// Merge unit progress for a (user, course) pair.
    SetUnitProgress {
        user_id: String,
        course_id: String,
        progress: Vec<UnitProgress>,
    },
    SetTeamProgress {
        team_id: String,
        progress: TeamProgress,
    },
    SetCalculation { calculation: CourseCalculation },
    /// Drop freshness stamps inside the scope; data stays readable.
    InvalidateCache { scope: InvalidationScope },
}

impl StoreCommand {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::SetLoading { .. } => "set_loading",
            StoreCommand::SetError { .. } => "set_error",
            StoreCommand::SetCourseProgress { .. } => "set_course_progress",
            StoreCommand::PatchCourseProgress { .. } => "patch_course_progress",
            StoreCommand::SetUnitProgress { .. } => "set_unit_progress",
            StoreCommand::SetTeamProgress { .. } => "set_team_progress",
            StoreCommand::SetCalculation { .. } => "set_calculation",
            StoreCommand::InvalidateCache { .. } => "invalidate_cache",
        }
    }

    /// Store key the command targets, if it targets exactly one.
    pub fn key(&self) -> Option<CacheKey> {
        match self {
            StoreCommand::SetLoading { key, .. } | StoreCommand::SetError { key, .. } => {
                Some(key.clone())
            }
            StoreCommand::SetCourseProgress { user_id, .. } => Some(CacheKey::course(user_id)),
            StoreCommand::PatchCourseProgress { progress } => {
                Some(CacheKey::course(&progress.user_id))
            }
            StoreCommand::SetUnitProgress {
                user_id, course_id, ..
            } => Some(CacheKey::unit(user_id, course_id)),
            StoreCommand::SetTeamProgress { team_id, .. } => Some(CacheKey::team(team_id)),
            StoreCommand::SetCalculation { calculation } => Some(CacheKey::calculation(
                &calculation.user_id,
                &calculation.course_id,
            )),
            StoreCommand::InvalidateCache { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_keys() {
        let patch = StoreCommand::PatchCourseProgress {
            progress: CourseProgress::new("u1", "c1", 40),
        };
        assert_eq!(patch.key(), Some(CacheKey::course("u1")));
        assert_eq!(patch.name(), "patch_course_progress");

        let units = StoreCommand::SetUnitProgress {
            user_id: "u1".into(),
            course_id: "c1".into(),
            progress: vec![],
        };
        assert_eq!(units.key(), Some(CacheKey::unit("u1", "c1")));

        let invalidate = StoreCommand::InvalidateCache {
            scope: InvalidationScope::All,
        };
        assert_eq!(invalidate.key(), None);
    }
}
