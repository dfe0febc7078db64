//! Structured cache keys, invalidation scopes and dependency tags.
//!
//! Keys are composite values rather than strings, so invalidating one user or
//! one course is a structural match and two callers cannot collide by picking
//! overlapping prefixes. The rendered string forms (`course-<user>`,
//! `<user>-<course>`, `team-<team>`, `calc-<user>-<course>`) are kept for
//! logging and for [`InvalidationScope::Pattern`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Domain of a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    CourseProgress,
    UnitProgress,
    TeamProgress,
    Calculation,
    UserDashboard,
    TeamDashboard,
}

/// Composite cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheKey {
    /// All course progress of one user.
    CourseProgress { user_id: String },
    /// Unit progress of one user in one course.
    UnitProgress { user_id: String, course_id: String },
    /// Rollup of one team.
    TeamProgress { team_id: String },
    /// Derived course calculation of one user.
    Calculation { user_id: String, course_id: String },
    /// Dashboard aggregate for one user.
    UserDashboard { user_id: String },
    /// Dashboard aggregate for one team.
    TeamDashboard { team_id: String },
}

impl CacheKey {
    pub fn course(user_id: impl Into<String>) -> Self {
        CacheKey::CourseProgress {
            user_id: user_id.into(),
        }
    }

    pub fn unit(user_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        CacheKey::UnitProgress {
            user_id: user_id.into(),
            course_id: course_id.into(),
        }
    }

    pub fn team(team_id: impl Into<String>) -> Self {
        CacheKey::TeamProgress {
            team_id: team_id.into(),
        }
    }

    pub fn calculation(user_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        CacheKey::Calculation {
            user_id: user_id.into(),
            course_id: course_id.into(),
        }
    }

    pub fn user_dashboard(user_id: impl Into<String>) -> Self {
        CacheKey::UserDashboard {
            user_id: user_id.into(),
        }
    }

    pub fn team_dashboard(team_id: impl Into<String>) -> Self {
        CacheKey::TeamDashboard {
            team_id: team_id.into(),
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            CacheKey::CourseProgress { .. } => KeyKind::CourseProgress,
            CacheKey::UnitProgress { .. } => KeyKind::UnitProgress,
            CacheKey::TeamProgress { .. } => KeyKind::TeamProgress,
            CacheKey::Calculation { .. } => KeyKind::Calculation,
            CacheKey::UserDashboard { .. } => KeyKind::UserDashboard,
            CacheKey::TeamDashboard { .. } => KeyKind::TeamDashboard,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            CacheKey::CourseProgress { user_id }
            | CacheKey::UnitProgress { user_id, .. }
            | CacheKey::Calculation { user_id, .. }
            | CacheKey::UserDashboard { user_id } => Some(user_id),
            CacheKey::TeamProgress { .. } | CacheKey::TeamDashboard { .. } => None,
        }
    }

    pub fn course_id(&self) -> Option<&str> {
        match self {
            CacheKey::UnitProgress { course_id, .. } | CacheKey::Calculation { course_id, .. } => {
                Some(course_id)
            }
            _ => None,
        }
    }

    pub fn team_id(&self) -> Option<&str> {
        match self {
            CacheKey::TeamProgress { team_id } | CacheKey::TeamDashboard { team_id } => {
                Some(team_id)
            }
            _ => None,
        }
    }

    /// Whether this key falls inside `scope`.
    pub fn matches(&self, scope: &InvalidationScope) -> bool {
        match scope {
            InvalidationScope::All => true,
            InvalidationScope::Key(key) => key == self,
            InvalidationScope::Kind(kind) => self.kind() == *kind,
            InvalidationScope::User(user_id) => self.user_id() == Some(user_id.as_str()),
            InvalidationScope::Course(course_id) => self.course_id() == Some(course_id.as_str()),
            InvalidationScope::Team(team_id) => self.team_id() == Some(team_id.as_str()),
            InvalidationScope::Pattern(pattern) => self.to_string().contains(pattern.as_str()),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::CourseProgress { user_id } => write!(f, "course-{}", user_id),
            CacheKey::UnitProgress { user_id, course_id } => {
                write!(f, "{}-{}", user_id, course_id)
            }
            CacheKey::TeamProgress { team_id } => write!(f, "team-{}", team_id),
            CacheKey::Calculation { user_id, course_id } => {
                write!(f, "calc-{}-{}", user_id, course_id)
            }
            CacheKey::UserDashboard { user_id } => write!(f, "dashboard-user-{}", user_id),
            CacheKey::TeamDashboard { team_id } => write!(f, "dashboard-team-{}", team_id),
        }
    }
}

/// Which keys an invalidation touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "value", rename_all = "snake_case")]
pub enum InvalidationScope {
    All,
    Key(CacheKey),
    Kind(KeyKind),
    /// Every key that belongs to the user.
    User(String),
    /// Every per-course key of the course, across users.
    Course(String),
    Team(String),
    /// Substring match on the rendered key.
    Pattern(String),
}

/// Set of dependency tags attached to a cache entry.
pub type Dependencies = BTreeSet<String>;

/// Build a dependency set from anything string-like.
pub fn dependencies<I, S>(tags: I) -> Dependencies
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter().map(Into::into).collect()
}

/// Well-known dependency tags.
pub mod tags {
    /// Anything derived from course structure or course progress.
    pub const COURSES: &str = "courses";
    /// Anything derived from progress records.
    pub const PROGRESS: &str = "progress";
    /// Anything derived from team membership.
    pub const TEAMS: &str = "teams";

    pub fn user(user_id: &str) -> String {
        format!("user:{}", user_id)
    }

    pub fn course(course_id: &str) -> String {
        format!("course:{}", course_id)
    }

    pub fn team(team_id: &str) -> String {
        format!("team:{}", team_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendered_keys_keep_namespaces() {
        assert_eq!(CacheKey::course("u1").to_string(), "course-u1");
        assert_eq!(CacheKey::unit("u1", "c9").to_string(), "u1-c9");
        assert_eq!(CacheKey::team("t3").to_string(), "team-t3");
        assert_eq!(CacheKey::calculation("u1", "c9").to_string(), "calc-u1-c9");
    }

    #[test]
    fn test_structural_scopes() {
        let unit = CacheKey::unit("u1", "c1");
        let calc = CacheKey::calculation("u1", "c1");
        let other = CacheKey::unit("u2", "c1");
        let team = CacheKey::team("t1");

        let user_scope = InvalidationScope::User("u1".into());
        assert!(unit.matches(&user_scope));
        assert!(calc.matches(&user_scope));
        assert!(!other.matches(&user_scope));
        assert!(!team.matches(&user_scope));

        let course_scope = InvalidationScope::Course("c1".into());
        assert!(unit.matches(&course_scope));
        assert!(other.matches(&course_scope));
        assert!(!CacheKey::course("u1").matches(&course_scope));

        assert!(team.matches(&InvalidationScope::Kind(KeyKind::TeamProgress)));
        assert!(team.matches(&InvalidationScope::All));
    }

    #[test]
    fn test_user_scope_does_not_collide_on_prefix() {
        // "u1" is a string prefix of "u10" but not the same user.
        let key = CacheKey::course("u10");
        assert!(!key.matches(&InvalidationScope::User("u1".into())));
        assert!(key.matches(&InvalidationScope::Pattern("course-u1".into())));
    }

    #[test]
    fn test_dependencies_helper() {
        let deps = dependencies([tags::COURSES, "user:u1"]);
        assert_eq!(deps.len(), 2);
        assert!(deps.contains("courses"));
        assert_eq!(tags::team("t1"), "team:t1");
    }
}
