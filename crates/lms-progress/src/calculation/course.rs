//! Course progress derivation.
//!
//! Percentages are always recomputed from integer unit counts, never patched,
//! so two users with the same completion see the same number and repeated
//! calculations cannot drift.

use chrono::{DateTime, Utc};

use crate::models::{CourseCalculation, LessonNode, ProgressStatus};

/// `completed / total` as a whole percentage, rounded half up.
///
/// Uses integer arithmetic only. A course with no units is 0 %.
pub fn completion_percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    ((completed * 200 + total) / (total * 2)) as u8
}

/// Count `(total_units, completed_units)` for `user_id` across all lessons.
pub fn count_units(lessons: &[LessonNode], user_id: &str) -> (usize, usize) {
    lessons
        .iter()
        .flat_map(|lesson| lesson.units.iter())
        .fold((0, 0), |(total, completed), unit| {
            (total + 1, completed + usize::from(unit.is_completed_by(user_id)))
        })
}

/// Derive a course calculation from the joined lesson/unit rows.
pub fn derive_course_calculation(
    user_id: &str,
    course_id: &str,
    lessons: &[LessonNode],
    now: DateTime<Utc>,
) -> CourseCalculation {
    let (total_units, completed_units) = count_units(lessons, user_id);
    let progress_percentage = completion_percentage(completed_units, total_units);
    CourseCalculation {
        user_id: user_id.to_string(),
        course_id: course_id.to_string(),
        progress_percentage,
        status: ProgressStatus::from_percentage(progress_percentage),
        total_units,
        completed_units,
        calculated_at: now,
    }
}
