//! Fetch actions that populate the store from the backend.

use futures::future::FutureExt;
use std::collections::BTreeSet;
use tracing::{debug, instrument, warn};

use super::ProgressEngine;
use crate::cache::CacheKey;
use crate::error::Result;
use crate::rollup::{build_team_progress, TeamRows};
use crate::store::StoreCommand;

impl ProgressEngine {
    /// Load every course progress row of a user.
    ///
    /// One joined query returns courses with their lessons, units and unit
    /// progress; the unit progress of each course is stored as well, so a
    /// following per-course read needs no extra round trip.
    #[instrument(skip(self))]
    pub async fn fetch_course_progress(&self, user_id: &str, force: bool) -> Result<()> {
        let key = CacheKey::course(user_id);
        if !force && self.is_fresh(&key) {
            debug!("Course progress for {} is fresh, skipping fetch", user_id);
            return Ok(());
        }

        let engine = self.clone();
        let user_id = user_id.to_string();
        let work = async move { engine.load_course_progress(&user_id).await }.boxed();
        self.run_keyed(key, work, !force).await
    }

    async fn load_course_progress(&self, user_id: &str) -> Result<()> {
        let trees = self.backend().course_progress_tree(user_id).await?;
        debug!(
            "Fetched {} courses for {}, pre-populating unit progress",
            trees.len(),
            user_id
        );

        for tree in &trees {
            self.dispatch(StoreCommand::SetUnitProgress {
                user_id: user_id.to_string(),
                course_id: tree.progress.course_id.clone(),
                progress: tree.unit_progress(),
            });
        }
        self.dispatch(StoreCommand::SetCourseProgress {
            user_id: user_id.to_string(),
            progress: trees.into_iter().map(|tree| tree.progress).collect(),
        });
        Ok(())
    }

    /// Load the unit progress of one (user, course) pair.
    #[instrument(skip(self))]
    pub async fn fetch_unit_progress(
        &self,
        user_id: &str,
        course_id: &str,
        force: bool,
    ) -> Result<()> {
        let key = CacheKey::unit(user_id, course_id);
        if !force && self.is_fresh(&key) {
            debug!("Unit progress for {} is fresh, skipping fetch", key);
            return Ok(());
        }

        let engine = self.clone();
        let user_id = user_id.to_string();
        let course_id = course_id.to_string();
        let work = async move {
            let rows = engine.backend().unit_progress(&user_id, &course_id).await?;
            engine.dispatch(StoreCommand::SetUnitProgress {
                user_id,
                course_id,
                progress: rows,
            });
            Ok(())
        }
        .boxed();
        self.run_keyed(key, work, !force).await
    }

    /// Load a team rollup.
    ///
    /// Memberships come first; profiles, assignments and course progress for
    /// the members are then requested concurrently. A failed profile lookup
    /// only costs display names.
    #[instrument(skip(self))]
    pub async fn fetch_team_progress(&self, team_id: &str, force: bool) -> Result<()> {
        let key = CacheKey::team(team_id);
        if !force && self.is_fresh(&key) {
            debug!("Team progress for {} is fresh, skipping fetch", team_id);
            return Ok(());
        }

        let engine = self.clone();
        let team_id = team_id.to_string();
        let work = async move { engine.load_team_progress(&team_id).await }.boxed();
        self.run_keyed(key, work, !force).await
    }

    async fn load_team_progress(&self, team_id: &str) -> Result<()> {
        let backend = self.backend();
        let memberships = backend.team_memberships(team_id).await?;

        let user_ids: Vec<String> = memberships
            .iter()
            .map(|m| m.user_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut rows = TeamRows {
            memberships,
            ..TeamRows::default()
        };

        if !user_ids.is_empty() {
            let (profiles, assignments, progress) = futures::join!(
                backend.profiles(&user_ids),
                backend.course_assignments(&user_ids),
                backend.course_progress_for_users(&user_ids),
            );
            rows.profiles = profiles.unwrap_or_else(|e| {
                warn!("Profile lookup for team {} failed, using ids: {}", team_id, e);
                Vec::new()
            });
            rows.assignments = assignments?;
            rows.progress = progress?
                .into_iter()
                .map(|row| row.normalized())
                .collect();
        }

        let team = build_team_progress(team_id, &rows);
        debug!("Rolled up {} members for team {}", team.members.len(), team_id);
        self.dispatch(StoreCommand::SetTeamProgress {
            team_id: team_id.to_string(),
            progress: team,
        });
        Ok(())
    }
}
