//! Per-member team aggregation.
//!
//! Joins memberships with profiles, assignments and course progress through
//! hash maps built once per rollup, so each member costs O(assigned courses)
//! instead of a scan over every fetched row.

use std::collections::{BTreeSet, HashMap};

use crate::calculation::analytics::mean_percentage;
use crate::models::{
    CourseAssignment, CourseProgress, Profile, ProgressStatus, TeamMemberProgress, TeamMembership,
    TeamProgress,
};

/// Rows fetched for one team rollup.
#[derive(Debug, Clone, Default)]
pub struct TeamRows {
    pub memberships: Vec<TeamMembership>,
    pub profiles: Vec<Profile>,
    pub assignments: Vec<CourseAssignment>,
    pub progress: Vec<CourseProgress>,
}

/// Aggregate one member.
///
/// Only assigned courses count. An assigned course without a progress row
/// contributes 0 %.
fn member_progress(
    user_id: &str,
    profile: Option<&Profile>,
    assigned: Option<&BTreeSet<&str>>,
    progress: &HashMap<(&str, &str), &CourseProgress>,
) -> TeamMemberProgress {
    let assigned: Vec<&str> = assigned
        .map(|courses| courses.iter().copied().collect())
        .unwrap_or_default();

    let rows: Vec<Option<&&CourseProgress>> = assigned
        .iter()
        .map(|course_id| progress.get(&(user_id, *course_id)))
        .collect();

    let completed_courses = rows
        .iter()
        .flatten()
        .filter(|row| row.status == ProgressStatus::Completed)
        .count();
    let overall_progress = mean_percentage(
        rows.iter()
            .map(|row| row.map_or(0, |row| row.progress_percentage)),
    );

    let email = profile.map(|p| p.email.clone()).unwrap_or_default();
    let name = profile
        .and_then(|p| p.full_name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| {
            if email.is_empty() {
                user_id.to_string()
            } else {
                email.clone()
            }
        });

    TeamMemberProgress {
        user_id: user_id.to_string(),
        email,
        name,
        total_courses: assigned.len(),
        completed_courses,
        overall_progress,
    }
}

/// Build the rollup for `team_id` from the fetched rows.
///
/// Members keep membership order; a user listed twice is counted once.
pub fn build_team_progress(team_id: &str, rows: &TeamRows) -> TeamProgress {
    let profiles: HashMap<&str, &Profile> = rows
        .profiles
        .iter()
        .map(|p| (p.user_id.as_str(), p))
        .collect();

    let mut assignments: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for assignment in &rows.assignments {
        assignments
            .entry(assignment.user_id.as_str())
            .or_default()
            .insert(assignment.course_id.as_str());
    }

    let progress: HashMap<(&str, &str), &CourseProgress> = rows
        .progress
        .iter()
        .map(|row| ((row.user_id.as_str(), row.course_id.as_str()), row))
        .collect();

    let mut seen = BTreeSet::new();
    let members = rows
        .memberships
        .iter()
        .filter(|m| m.team_id == team_id && seen.insert(m.user_id.as_str()))
        .map(|m| {
            let user_id = m.user_id.as_str();
            member_progress(
                user_id,
                profiles.get(user_id).copied(),
                assignments.get(user_id),
                &progress,
            )
        })
        .collect();

    TeamProgress {
        team_id: team_id.to_string(),
        members,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn membership(user: &str) -> TeamMembership {
        TeamMembership {
            team_id: "t1".into(),
            user_id: user.into(),
            role: None,
        }
    }

    fn assignment(user: &str, course: &str) -> CourseAssignment {
        CourseAssignment {
            user_id: user.into(),
            course_id: course.into(),
            assigned_at: None,
            due_at: None,
        }
    }

    #[test]
    fn test_member_aggregates() {
        let rows = TeamRows {
            memberships: vec![membership("ann"), membership("ben")],
            profiles: vec![Profile {
                user_id: "ann".into(),
                email: "ann@firm.test".into(),
                full_name: Some("Ann Lee".into()),
            }],
            assignments: vec![
                assignment("ann", "c1"),
                assignment("ann", "c2"),
                assignment("ben", "c1"),
            ],
            progress: vec![
                CourseProgress::new("ann", "c1", 100),
                CourseProgress::new("ann", "c2", 50),
                // Not assigned to ann; ignored.
                CourseProgress::new("ann", "c9", 100),
            ],
        };

        let team = build_team_progress("t1", &rows);
        assert_eq!(team.members.len(), 2);

        let ann = &team.members[0];
        assert_eq!(ann.name, "Ann Lee");
        assert_eq!(ann.total_courses, 2);
        assert_eq!(ann.completed_courses, 1);
        assert_eq!(ann.overall_progress, 75);

        let ben = &team.members[1];
        assert_eq!(ben.name, "ben");
        assert_eq!(ben.email, "");
        assert_eq!(ben.total_courses, 1);
        assert_eq!(ben.overall_progress, 0);
    }

    #[test]
    fn test_duplicate_membership_counted_once() {
        let rows = TeamRows {
            memberships: vec![membership("ann"), membership("ann")],
            ..TeamRows::default()
        };
        let team = build_team_progress("t1", &rows);
        assert_eq!(team.members.len(), 1);
        assert_eq!(team.members[0].total_courses, 0);
    }

    #[test]
    fn test_duplicate_assignment_counted_once() {
        let rows = TeamRows {
            memberships: vec![membership("ann")],
            assignments: vec![assignment("ann", "c1"), assignment("ann", "c1")],
            progress: vec![CourseProgress::new("ann", "c1", 100)],
            ..TeamRows::default()
        };
        let team = build_team_progress("t1", &rows);
        assert_eq!(team.members[0].total_courses, 1);
        assert_eq!(team.members[0].completed_courses, 1);
    }
}
