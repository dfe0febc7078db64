//! Course calculation and the unit write path.

use futures::future::FutureExt;
use tracing::{debug, instrument, warn};

use super::ProgressEngine;
use crate::cache::{tags, CacheKey, InvalidationScope};
use crate::calculation::derive_course_calculation;
use crate::error::{ProgressError, Result};
use crate::models::{CourseCalculation, CourseProgress, UnitProgress};
use crate::store::StoreCommand;

impl ProgressEngine {
    /// Derive a course's percentage and status from its unit records.
    ///
    /// Returns the cached calculation while it is fresh. A course without
    /// lessons or units yields 0 % / `not_started`.
    #[instrument(skip(self))]
    pub async fn calculate_course_progress(
        &self,
        user_id: &str,
        course_id: &str,
    ) -> Result<CourseCalculation> {
        let key = CacheKey::calculation(user_id, course_id);
        if self.is_fresh(&key) {
            if let Some(calculation) = self.get_calculation(&key) {
                debug!("Calculation {} is fresh", key);
                return Ok(calculation);
            }
        }
        self.recalculate(user_id, course_id, true).await
    }

    async fn recalculate(
        &self,
        user_id: &str,
        course_id: &str,
        share: bool,
    ) -> Result<CourseCalculation> {
        let key = CacheKey::calculation(user_id, course_id);
        let engine = self.clone();
        let (user, course) = (user_id.to_string(), course_id.to_string());
        let work = async move {
            let lessons = engine.backend().course_units(&user, &course).await?;
            let now = engine.clock().now();
            let calculation = derive_course_calculation(&user, &course, &lessons, now);
            debug!(
                "Calculated {}/{} units ({}%) for {}/{}",
                calculation.completed_units,
                calculation.total_units,
                calculation.progress_percentage,
                user,
                course
            );
            engine.dispatch(StoreCommand::SetCalculation { calculation });
            Ok(())
        }
        .boxed();

        self.run_keyed(key.clone(), work, share).await?;
        self.get_calculation(&key).ok_or_else(|| ProgressError::NotFound {
            entity: "calculation".to_string(),
            id: key.to_string(),
        })
    }

    /// Record a unit as completed (or not) and bring every derived entry up
    /// to date.
    ///
    /// Completion is irreversible: asking to un-complete a completed unit
    /// leaves it untouched. After the write the unit and calculation entries
    /// of the pair are invalidated, unit progress is re-fetched, the course
    /// percentage is recomputed from the full unit set and persisted, and the
    /// user's cached course list is replaced with the new row.
    #[instrument(skip(self))]
    pub async fn update_unit_progress(
        &self,
        user_id: &str,
        unit_id: &str,
        course_id: &str,
        completed: bool,
    ) -> Result<CourseCalculation> {
        let unit_key = CacheKey::unit(user_id, course_id);
        let calc_key = CacheKey::calculation(user_id, course_id);

        if !completed {
            self.fetch_unit_progress(user_id, course_id, false).await?;
            let already_done = self
                .get_unit_progress(user_id, course_id)
                .is_some_and(|rows| rows.iter().any(|u| u.unit_id == unit_id && u.completed));
            if already_done {
                debug!("Unit {} already completed by {}, ignoring", unit_id, user_id);
                return self.calculate_course_progress(user_id, course_id).await;
            }
        }

        let now = self.clock().now();
        let record =
            UnitProgress::new(user_id, course_id, unit_id, completed, completed.then_some(now));
        if let Err(e) = self.bounded(&unit_key, self.write_unit_progress(&record)).await {
            warn!("Unit progress write for {} failed: {}", unit_key, e);
            self.dispatch(StoreCommand::SetError {
                key: unit_key,
                message: e.to_string(),
            });
            return Err(e);
        }

        self.dispatch(StoreCommand::InvalidateCache {
            scope: InvalidationScope::Key(unit_key),
        });
        self.dispatch(StoreCommand::InvalidateCache {
            scope: InvalidationScope::Key(calc_key),
        });
        self.notify_tag(&tags::user(user_id));
        self.notify_tag(&tags::course(course_id));
        self.invalidate_member_teams(user_id);

        self.fetch_unit_progress(user_id, course_id, true).await?;
        let calculation = self.recalculate(user_id, course_id, false).await?;
        self.persist_course_progress(&calculation).await;
        Ok(calculation)
    }

    /// Mark every cached team rollup listing `user_id` as stale.
    fn invalidate_member_teams(&self, user_id: &str) {
        let snapshot = self.snapshot();
        let teams: Vec<&String> = snapshot
            .team_progress
            .iter()
            .filter(|(_, team)| team.members.iter().any(|m| m.user_id == user_id))
            .map(|(team_id, _)| team_id)
            .collect();
        for team_id in teams {
            debug!("Team {} lists {}, marking its rollup stale", team_id, user_id);
            self.dispatch(StoreCommand::InvalidateCache {
                scope: InvalidationScope::Key(CacheKey::team(team_id)),
            });
            self.notify_tag(&tags::team(team_id));
        }
    }

    /// Insert, and on a duplicate-key conflict retry as an update. A second
    /// conflict means another writer stored the same row; it is not an error.
    async fn write_unit_progress(&self, record: &UnitProgress) -> Result<()> {
        match self.backend().upsert_unit_progress(record).await {
            Err(e) if e.is_conflict() => {
                debug!("Unit progress insert conflicted, retrying as update: {}", e);
                match self.backend().update_unit_progress(record).await {
                    Err(e) if e.is_conflict() => {
                        warn!("Ignoring repeated unit progress conflict: {}", e);
                        Ok(())
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn write_course_progress(&self, record: &CourseProgress) -> Result<()> {
        match self.backend().upsert_course_progress(record).await {
            Err(e) if e.is_conflict() => {
                debug!("Course progress insert conflicted, retrying as update: {}", e);
                match self.backend().update_course_progress(record).await {
                    Err(e) if e.is_conflict() => {
                        warn!("Ignoring repeated course progress conflict: {}", e);
                        Ok(())
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Store the recomputed course row and patch it into the cached list.
    ///
    /// The list keeps its fetch stamp, since the other rows were not
    /// re-read. A failed write is logged; the unit write already succeeded and
    /// the next bulk recalculation repairs the course row.
    async fn persist_course_progress(&self, calculation: &CourseCalculation) {
        let user_id = calculation.user_id.as_str();
        let cached = self.get_course_progress(user_id);
        let previous = cached
            .as_ref()
            .and_then(|rows| rows.iter().find(|row| row.course_id == calculation.course_id));
        let row = CourseProgress::from_calculation(calculation, previous, self.clock().now());

        let key = CacheKey::course(user_id);
        if let Err(e) = self.bounded(&key, self.write_course_progress(&row)).await {
            warn!("Course progress write for {} failed: {}", key, e);
            return;
        }

        self.dispatch(StoreCommand::PatchCourseProgress { progress: row });
        debug!(
            "Course {} for {} now at {}% ({})",
            calculation.course_id, user_id, calculation.progress_percentage, calculation.status
        );
    }
}
