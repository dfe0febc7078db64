//! Data model shared by the store, the calculation engine and the backend.

mod progress;
mod records;
mod team;

pub use progress::{CourseCalculation, CourseProgress, ProgressStatus, UnitProgress};
pub use records::{
    CourseAssignment, CourseProgressTree, LessonNode, ProcedureResult, Profile, TeamMembership,
    UnitNode,
};
pub use team::{TeamMemberProgress, TeamProgress};
