//! Batch actions and bulk backend procedures.

use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::ProgressEngine;
use crate::backend::procedures;
use crate::cache::{tags, CacheKey, InvalidationScope};
use crate::error::{ProgressError, Result};
use crate::models::ProcedureResult;
use crate::store::StoreCommand;

/// Per-key outcome of a batch action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<CacheKey>,
    pub failed: Vec<(CacheKey, ProgressError)>,
}

impl BatchReport {
    fn from_outcomes(outcomes: Vec<(CacheKey, Result<()>)>) -> Self {
        let mut report = Self::default();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(key),
                Err(e) => report.failed.push((key, e)),
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

impl ProgressEngine {
    /// Fetch course progress for many users concurrently.
    ///
    /// One user's failure is recorded in the report and in that user's error
    /// slot; the other fetches still complete.
    #[instrument(skip(self, user_ids), fields(users = user_ids.len()))]
    pub async fn batch_fetch_course_progress(
        &self,
        user_ids: &[String],
        force: bool,
    ) -> BatchReport {
        let outcomes = join_all(user_ids.iter().map(|user_id| async move {
            let outcome = self.fetch_course_progress(user_id, force).await;
            (CacheKey::course(user_id), outcome)
        }))
        .await;

        let report = BatchReport::from_outcomes(outcomes);
        if !report.is_complete() {
            warn!(
                "Batch course progress fetch: {} of {} failed",
                report.failed.len(),
                report.total()
            );
        }
        report
    }

    /// Calculate many (user, course) pairs concurrently.
    #[instrument(skip(self, pairs), fields(pairs = pairs.len()))]
    pub async fn batch_calculate_progress(&self, pairs: &[(String, String)]) -> BatchReport {
        let outcomes = join_all(pairs.iter().map(|(user_id, course_id)| async move {
            let outcome = self
                .calculate_course_progress(user_id, course_id)
                .await
                .map(|_| ());
            (CacheKey::calculation(user_id, course_id), outcome)
        }))
        .await;

        let report = BatchReport::from_outcomes(outcomes);
        if !report.is_complete() {
            warn!(
                "Batch calculation: {} of {} failed",
                report.failed.len(),
                report.total()
            );
        }
        report
    }

    async fn run_procedure(&self, name: &str) -> Result<ProcedureResult> {
        let result = self
            .bounded(name, self.backend().call_procedure(name, serde_json::json!({})))
            .await?;
        if !result.success {
            return Err(ProgressError::Procedure {
                name: name.to_string(),
                message: result.errors.join("; "),
            });
        }
        Ok(result)
    }

    /// Recompute every stored course progress row server side.
    ///
    /// Every store entry becomes stale and every cache entry depending on
    /// progress is dropped, since any of them may have changed.
    #[instrument(skip(self))]
    pub async fn recalculate_all_progress(&self) -> Result<ProcedureResult> {
        let result = self.run_procedure(procedures::RECALCULATE_ALL_PROGRESS).await?;
        info!(
            "Recalculated progress: {} records updated for {} users",
            result.records_updated, result.users_affected
        );

        self.dispatch(StoreCommand::InvalidateCache {
            scope: InvalidationScope::All,
        });
        self.notify_tag(tags::PROGRESS);
        Ok(result)
    }

    /// Report course progress rows that disagree with their unit records.
    #[instrument(skip(self))]
    pub async fn diagnose_progress(&self) -> Result<ProcedureResult> {
        let result = self.run_procedure(procedures::DIAGNOSE_PROGRESS).await?;
        if result.errors.is_empty() {
            info!("Progress diagnosis found no inconsistencies");
        } else {
            warn!(
                "Progress diagnosis found {} inconsistencies across {} users",
                result.errors.len(),
                result.users_affected
            );
        }
        Ok(result)
    }
}
