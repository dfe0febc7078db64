//! Progress calculation.
//!
//! - [`course`]: course percentage and status from unit records
//! - [`analytics`]: per-user statistics over cached progress

pub mod analytics;
pub mod course;

pub use analytics::{learning_analytics, user_overall_stats, LearningAnalytics, UserOverallStats};
pub use course::{completion_percentage, count_units, derive_course_calculation};
