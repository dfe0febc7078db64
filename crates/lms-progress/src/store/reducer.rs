//! Pure state transitions.
//!
//! `reduce` never mutates its input. Every populating command stamps
//! `last_updated`, clears the loading flag and clears the error slot for its
//! key; `SetError` clears loading but leaves data and stamp alone.
//! `PatchCourseProgress` edits one cached row and touches no stamp.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::command::StoreCommand;
use super::state::ProgressState;
use crate::cache::CacheKey;
use crate::models::UnitProgress;

fn settle(state: &mut ProgressState, key: CacheKey, now: DateTime<Utc>) {
    state.loading.remove(&key);
    state.errors.remove(&key);
    state.last_updated.insert(key, now);
}

/// Merge incoming rows over existing ones by unit id.
///
/// Incoming order is kept; existing completed units missing from the incoming
/// set are appended so a partial response cannot un-complete them.
fn merge_units(
    existing: Option<&[UnitProgress]>,
    incoming: Vec<UnitProgress>,
) -> Vec<UnitProgress> {
    let Some(existing) = existing else {
        return incoming;
    };
    let mut previous: HashMap<&str, &UnitProgress> =
        existing.iter().map(|u| (u.unit_id.as_str(), u)).collect();

    let mut merged: Vec<UnitProgress> = incoming
        .into_iter()
        .map(|row| match previous.remove(row.unit_id.as_str()) {
            Some(old) => UnitProgress::merge(old, row),
            None => row,
        })
        .collect();

    merged.extend(
        existing
            .iter()
            .filter(|u| u.completed && previous.contains_key(u.unit_id.as_str()))
            .cloned(),
    );
    merged
}

/// Apply one command to a snapshot, producing the next snapshot.
pub fn reduce(state: &ProgressState, command: StoreCommand, now: DateTime<Utc>) -> ProgressState {
    let mut next = state.clone();
    next.version += 1;

    match command {
        StoreCommand::SetLoading { key, loading } => {
            if loading {
                next.errors.remove(&key);
                next.loading.insert(key);
            } else {
                next.loading.remove(&key);
            }
        }
        StoreCommand::SetError { key, message } => {
            next.loading.remove(&key);
            next.errors.insert(key, message);
        }
        StoreCommand::SetCourseProgress { user_id, progress } => {
            let rows = progress.into_iter().map(|row| row.normalized()).collect();
            next.course_progress.insert(user_id.clone(), Arc::new(rows));
            settle(&mut next, CacheKey::course(user_id), now);
        }
        StoreCommand::PatchCourseProgress { progress } => {
            let row = progress.normalized();
            if let Some(rows) = state.course_progress.get(&row.user_id) {
                let mut patched: Vec<_> = rows
                    .iter()
                    .filter(|existing| existing.course_id != row.course_id)
                    .cloned()
                    .collect();
                let position = rows
                    .iter()
                    .position(|existing| existing.course_id == row.course_id)
                    .unwrap_or(patched.len());
                let user_id = row.user_id.clone();
                patched.insert(position, row);
                next.course_progress.insert(user_id, Arc::new(patched));
            }
        }
        StoreCommand::SetUnitProgress {
            user_id,
            course_id,
            progress,
        } => {
            let slot = (user_id.clone(), course_id.clone());
            let merged = merge_units(
                state.unit_progress.get(&slot).map(|rows| rows.as_slice()),
                progress,
            );
            next.unit_progress.insert(slot, Arc::new(merged));
            settle(&mut next, CacheKey::unit(user_id, course_id), now);
        }
        StoreCommand::SetTeamProgress { team_id, progress } => {
            next.team_progress.insert(team_id.clone(), Arc::new(progress));
            settle(&mut next, CacheKey::team(team_id), now);
        }
        StoreCommand::SetCalculation { calculation } => {
            let key = CacheKey::calculation(&calculation.user_id, &calculation.course_id);
            next.calculations.insert(
                (calculation.user_id.clone(), calculation.course_id.clone()),
                calculation,
            );
            settle(&mut next, key, now);
        }
        StoreCommand::InvalidateCache { scope } => {
            next.last_updated.retain(|key, _| !key.matches(&scope));
        }
    }

    next
}
