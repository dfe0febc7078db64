//! Team rollups.

mod performance;
mod team;

pub use performance::{bucket_size, team_performance_metrics, TeamPerformanceMetrics, TeamTrend};
pub use team::{build_team_progress, TeamRows};
