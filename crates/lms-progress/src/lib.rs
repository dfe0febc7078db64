//! LMS Progress - progress tracking, calculation and caching for learning platforms.
//!
//! This crate keeps per-user course and unit progress, derives course
//! percentages from unit completion, rolls progress up to teams and serves it
//! all from a freshness-checked store. The persistent store is reached through
//! the [`ProgressBackend`] trait; nothing here talks to a database directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lms_progress::{InMemoryBackend, ProgressDashboard, ProgressEngine};
//!
//! #[tokio::main]
//! async fn main() -> lms_progress::Result<()> {
//!     let backend = Arc::new(InMemoryBackend::new());
//!     backend.add_course("rust-101", &[("basics", &["u1", "u2", "u3"])]);
//!
//!     let engine = ProgressEngine::builder(backend).build()?;
//!
//!     // Mark a unit complete; the course percentage is recomputed
//!     let calc = engine.update_unit_progress("ana", "u1", "rust-101", true).await?;
//!     println!("{}% {}", calc.progress_percentage, calc.status);
//!
//!     // Cached aggregates, dropped automatically on the next write
//!     let dashboards = ProgressDashboard::new(engine.clone());
//!     let ana = dashboards.user_dashboard("ana").await?;
//!     println!("{} courses", ana.stats.total_courses);
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod calculation;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod models;
pub mod rollup;
pub mod store;

// Re-export commonly used types
pub use backend::{DynBackend, InMemoryBackend, ProgressBackend};
pub use cache::{
    CacheKey, CacheStats, DependencyCache, InvalidationScope, InvalidationSink, SweeperHandle,
};
pub use calculation::{LearningAnalytics, UserOverallStats};
pub use cancel::{CancellationToken, CancelledError};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheConfig, EngineConfig, ProgressDefaults, RollupConfig};
pub use dashboard::{ProgressDashboard, TeamDashboard, UserDashboard};
pub use engine::{BatchReport, ProgressEngine, ProgressEngineBuilder};
pub use error::{ProgressError, Result};
pub use models::{
    CourseCalculation, CourseProgress, ProcedureResult, ProgressStatus, TeamMemberProgress,
    TeamProgress, UnitProgress,
};
pub use rollup::{TeamPerformanceMetrics, TeamTrend};
pub use store::{ProgressState, ProgressStore, StoreCommand};
