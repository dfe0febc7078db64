//! Course and unit progress records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Completion status of a course for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    /// Derive the status from a percentage.
    ///
    /// This is the only place status is decided, which keeps
    /// `Completed ⟺ 100` and `NotStarted ⟺ 0` true for every record.
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0 => ProgressStatus::NotStarted,
            p if p >= 100 => ProgressStatus::Completed,
            _ => ProgressStatus::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user's progress through one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_id: String,
    pub user_id: String,
    pub status: ProgressStatus,
    pub progress_percentage: u8,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl CourseProgress {
    /// Create a record whose status is derived from `percentage`.
    ///
    /// Percentages above 100 are clamped.
    pub fn new(user_id: impl Into<String>, course_id: impl Into<String>, percentage: u8) -> Self {
        let percentage = percentage.min(100);
        Self {
            course_id: course_id.into(),
            user_id: user_id.into(),
            status: ProgressStatus::from_percentage(percentage),
            progress_percentage: percentage,
            completed_at: None,
            last_accessed_at: None,
        }
    }

    /// Build the replacement record for a fresh calculation.
    ///
    /// The previous record only contributes timestamps; percentage and status
    /// always come from the calculation.
    pub fn from_calculation(
        calculation: &CourseCalculation,
        previous: Option<&CourseProgress>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self::new(
            calculation.user_id.clone(),
            calculation.course_id.clone(),
            calculation.progress_percentage,
        );
        record.completed_at = match record.status {
            ProgressStatus::Completed => previous.and_then(|p| p.completed_at).or(Some(now)),
            _ => None,
        };
        record.last_accessed_at = Some(now);
        record
    }

    /// Repair rows coming from the backend so status agrees with percentage.
    pub fn normalized(mut self) -> Self {
        self.progress_percentage = self.progress_percentage.min(100);
        self.status = ProgressStatus::from_percentage(self.progress_percentage);
        if self.status != ProgressStatus::Completed {
            self.completed_at = None;
        }
        self
    }

    /// Whether status and percentage agree.
    pub fn is_consistent(&self) -> bool {
        self.progress_percentage <= 100
            && self.status == ProgressStatus::from_percentage(self.progress_percentage)
    }
}

/// Completion record for a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitProgress {
    pub unit_id: String,
    pub course_id: String,
    pub user_id: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UnitProgress {
    pub fn new(
        user_id: impl Into<String>,
        course_id: impl Into<String>,
        unit_id: impl Into<String>,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            course_id: course_id.into(),
            user_id: user_id.into(),
            completed,
            completed_at,
        }
    }

    /// Merge a newer record into an existing one.
    ///
    /// Completion is irreversible: a completed unit stays completed and a later
    /// write may only refresh `completed_at`.
    pub fn merge(existing: &UnitProgress, incoming: UnitProgress) -> UnitProgress {
        match (existing.completed, incoming.completed) {
            (true, false) => existing.clone(),
            (true, true) => UnitProgress {
                completed_at: incoming.completed_at.or(existing.completed_at),
                ..incoming
            },
            _ => incoming,
        }
    }
}

/// Result of deriving a course's progress from its unit records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseCalculation {
    pub user_id: String,
    pub course_id: String,
    pub progress_percentage: u8,
    pub status: ProgressStatus,
    pub total_units: usize,
    pub completed_units: usize,
    pub calculated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_status_from_percentage() {
        assert_eq!(ProgressStatus::from_percentage(0), ProgressStatus::NotStarted);
        assert_eq!(ProgressStatus::from_percentage(1), ProgressStatus::InProgress);
        assert_eq!(ProgressStatus::from_percentage(99), ProgressStatus::InProgress);
        assert_eq!(ProgressStatus::from_percentage(100), ProgressStatus::Completed);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ProgressStatus::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
        assert_eq!(ProgressStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn test_normalized_repairs_inconsistent_row() {
        let mut row = CourseProgress::new("u1", "c1", 40);
        row.status = ProgressStatus::Completed;
        row.completed_at = Some(ts(0));
        assert!(!row.is_consistent());

        let fixed = row.normalized();
        assert!(fixed.is_consistent());
        assert_eq!(fixed.status, ProgressStatus::InProgress);
        assert!(fixed.completed_at.is_none());
    }

    #[test]
    fn test_new_clamps_percentage() {
        let row = CourseProgress::new("u1", "c1", 150);
        assert_eq!(row.progress_percentage, 100);
        assert_eq!(row.status, ProgressStatus::Completed);
    }

    #[test]
    fn test_from_calculation_keeps_first_completion_time() {
        let calc = CourseCalculation {
            user_id: "u1".into(),
            course_id: "c1".into(),
            progress_percentage: 100,
            status: ProgressStatus::Completed,
            total_units: 2,
            completed_units: 2,
            calculated_at: ts(100),
        };
        let mut previous = CourseProgress::new("u1", "c1", 100);
        previous.completed_at = Some(ts(10));

        let record = CourseProgress::from_calculation(&calc, Some(&previous), ts(100));
        assert_eq!(record.completed_at, Some(ts(10)));
        assert_eq!(record.last_accessed_at, Some(ts(100)));

        let fresh = CourseProgress::from_calculation(&calc, None, ts(100));
        assert_eq!(fresh.completed_at, Some(ts(100)));
    }

    #[test]
    fn test_unit_merge_never_uncompletes() {
        let done = UnitProgress::new("u1", "c1", "unit-1", true, Some(ts(5)));
        let undo = UnitProgress::new("u1", "c1", "unit-1", false, None);

        let merged = UnitProgress::merge(&done, undo);
        assert!(merged.completed);
        assert_eq!(merged.completed_at, Some(ts(5)));
    }

    #[test]
    fn test_unit_merge_refreshes_completion_time() {
        let done = UnitProgress::new("u1", "c1", "unit-1", true, Some(ts(5)));
        let again = UnitProgress::new("u1", "c1", "unit-1", true, Some(ts(50)));
        assert_eq!(UnitProgress::merge(&done, again).completed_at, Some(ts(50)));

        let open = UnitProgress::new("u1", "c1", "unit-1", false, None);
        let finish = UnitProgress::new("u1", "c1", "unit-1", true, Some(ts(7)));
        assert!(UnitProgress::merge(&open, finish).completed);
    }
}
