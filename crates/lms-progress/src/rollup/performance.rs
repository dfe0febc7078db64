//! Team performance partitioning and trend labels.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RollupConfig;
use crate::models::{TeamMemberProgress, TeamProgress};

/// Coarse completion trend.
///
/// Derived from the current completion rate only; no history is kept, so a
/// team that just regressed can still read as `Improving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamTrend {
    Improving,
    Stable,
    Declining,
}

impl TeamTrend {
    pub fn from_completion_rate(rate: f64, config: &RollupConfig) -> Self {
        if rate > config.improving_completion_rate {
            TeamTrend::Improving
        } else if rate < config.declining_completion_rate {
            TeamTrend::Declining
        } else {
            TeamTrend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TeamTrend::Improving => "improving",
            TeamTrend::Stable => "stable",
            TeamTrend::Declining => "declining",
        }
    }
}

impl fmt::Display for TeamTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPerformanceMetrics {
    pub team_id: String,
    pub total_members: usize,
    pub average_progress: u8,
    /// Completed over assigned courses across the team, 0–100.
    pub completion_rate: f64,
    /// Highest progress first.
    pub top_performers: Vec<TeamMemberProgress>,
    /// Lowest progress first.
    pub struggling_members: Vec<TeamMemberProgress>,
    pub trend: TeamTrend,
}

/// Upper bound on each partition: `max(1, ceil(members * fraction))`.
pub fn bucket_size(total_members: usize, fraction: f64) -> usize {
    ((total_members as f64 * fraction).ceil() as usize).max(1)
}

pub fn team_performance_metrics(
    team: &TeamProgress,
    config: &RollupConfig,
) -> TeamPerformanceMetrics {
    let bound = bucket_size(team.members.len(), config.bucket_fraction);

    let mut top_performers: Vec<TeamMemberProgress> = team
        .members
        .iter()
        .filter(|m| m.overall_progress >= config.top_performer_threshold)
        .cloned()
        .collect();
    top_performers.sort_by(|a, b| b.overall_progress.cmp(&a.overall_progress));
    top_performers.truncate(bound);

    let mut struggling_members: Vec<TeamMemberProgress> = team
        .members
        .iter()
        .filter(|m| m.overall_progress < config.struggling_threshold)
        .cloned()
        .collect();
    struggling_members.sort_by_key(|m| m.overall_progress);
    struggling_members.truncate(bound);

    let completion_rate = team.completion_rate();

    TeamPerformanceMetrics {
        team_id: team.team_id.clone(),
        total_members: team.members.len(),
        average_progress: team.average_progress(),
        completion_rate,
        top_performers,
        struggling_members,
        trend: TeamTrend::from_completion_rate(completion_rate, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, progress: u8, completed: usize) -> TeamMemberProgress {
        TeamMemberProgress {
            user_id: id.into(),
            email: format!("{id}@firm.test"),
            name: id.into(),
            total_courses: 2,
            completed_courses: completed,
            overall_progress: progress,
        }
    }

    fn team(members: Vec<TeamMemberProgress>) -> TeamProgress {
        TeamProgress {
            team_id: "t1".into(),
            members,
        }
    }

    #[test]
    fn test_five_member_partition() {
        let team = team(vec![
            member("a", 90, 1),
            member("b", 85, 1),
            member("c", 20, 0),
            member("d", 10, 0),
            member("e", 50, 1),
        ]);
        let metrics = team_performance_metrics(&team, &RollupConfig::default());

        assert_eq!(metrics.total_members, 5);
        assert_eq!(metrics.average_progress, 51);
        assert_eq!(metrics.top_performers.len(), 1);
        assert_eq!(metrics.top_performers[0].overall_progress, 90);
        assert_eq!(metrics.struggling_members.len(), 1);
        assert_eq!(metrics.struggling_members[0].overall_progress, 10);
        // 3 of 10 courses completed.
        assert!((metrics.completion_rate - 30.0).abs() < 1e-9);
        assert_eq!(metrics.trend, TeamTrend::Declining);
    }

    #[test]
    fn test_bucket_size() {
        assert_eq!(bucket_size(0, 0.2), 1);
        assert_eq!(bucket_size(5, 0.2), 1);
        assert_eq!(bucket_size(6, 0.2), 2);
        assert_eq!(bucket_size(10, 0.2), 2);
        assert_eq!(bucket_size(11, 0.2), 3);
    }

    #[test]
    fn test_larger_team_orders_partitions() {
        let members = (0..10u8)
            .map(|i| member(&format!("m{i}"), i * 10 + 5, 0))
            .collect();
        let metrics = team_performance_metrics(&team(members), &RollupConfig::default());

        let top: Vec<u8> = metrics.top_performers.iter().map(|m| m.overall_progress).collect();
        let low: Vec<u8> = metrics
            .struggling_members
            .iter()
            .map(|m| m.overall_progress)
            .collect();
        assert_eq!(top, vec![95, 85]);
        assert_eq!(low, vec![5, 15]);
    }

    #[test]
    fn test_trend_thresholds() {
        let config = RollupConfig::default();
        assert_eq!(TeamTrend::from_completion_rate(76.0, &config), TeamTrend::Improving);
        assert_eq!(TeamTrend::from_completion_rate(75.0, &config), TeamTrend::Stable);
        assert_eq!(TeamTrend::from_completion_rate(40.0, &config), TeamTrend::Stable);
        assert_eq!(TeamTrend::from_completion_rate(39.9, &config), TeamTrend::Declining);
        assert_eq!(TeamTrend::Improving.to_string(), "improving");
    }
}
