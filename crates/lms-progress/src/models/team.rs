//! Team rollup records.

use serde::{Deserialize, Serialize};

/// Aggregated progress of one team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMemberProgress {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub total_courses: usize,
    pub completed_courses: usize,
    /// Average percentage across the member's assigned courses.
    pub overall_progress: u8,
}

/// Derived per-team rollup. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamProgress {
    pub team_id: String,
    pub members: Vec<TeamMemberProgress>,
}

impl TeamProgress {
    /// Mean `overall_progress` across members, rounded half up. Zero for an
    /// empty team.
    pub fn average_progress(&self) -> u8 {
        let count = self.members.len() as u64;
        if count == 0 {
            return 0;
        }
        let sum: u64 = self.members.iter().map(|m| m.overall_progress as u64).sum();
        ((sum * 2 + count) / (count * 2)) as u8
    }

    /// Completed courses over assigned courses across the whole team, 0–100.
    pub fn completion_rate(&self) -> f64 {
        let total: usize = self.members.iter().map(|m| m.total_courses).sum();
        if total == 0 {
            return 0.0;
        }
        let completed: usize = self.members.iter().map(|m| m.completed_courses).sum();
        completed as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, total: usize, completed: usize, progress: u8) -> TeamMemberProgress {
        TeamMemberProgress {
            user_id: id.into(),
            email: format!("{id}@firm.test"),
            name: id.to_uppercase(),
            total_courses: total,
            completed_courses: completed,
            overall_progress: progress,
        }
    }

    #[test]
    fn test_average_progress() {
        let team = TeamProgress {
            team_id: "t1".into(),
            members: vec![
                member("a", 2, 1, 90),
                member("b", 2, 1, 85),
                member("c", 2, 0, 20),
                member("d", 2, 0, 10),
                member("e", 2, 1, 50),
            ],
        };
        assert_eq!(team.average_progress(), 51);
        assert!((team.completion_rate() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_team() {
        let team = TeamProgress {
            team_id: "t1".into(),
            members: vec![],
        };
        assert_eq!(team.average_progress(), 0);
        assert_eq!(team.completion_rate(), 0.0);
    }

    #[test]
    fn test_average_rounds_half_up() {
        let team = TeamProgress {
            team_id: "t1".into(),
            members: vec![member("a", 1, 0, 50), member("b", 1, 0, 51)],
        };
        assert_eq!(team.average_progress(), 51);
    }
}
