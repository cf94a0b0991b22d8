//! User-initiated transitions of a single code review.
//!
//! Each command validates its input, then loads, mutates and persists the
//! record in one locked [`ReviewStore::update`]. None of them reconcile against
//! the remote platform, except `snooze_until_update`, which refreshes first so
//! the baseline it stores is current.

use crate::error::AppError;
use crate::models::{now, CodeReview, CodeReviewStatus};
use crate::services::reconcile::{DELETION_RETENTION_SECS, REVIEW_GRACE_WINDOW_SECS};
use crate::services::review_store::ReviewStore;
use crate::services::sync_engine::SyncEngine;

/// Longest id accepted from a client.
const MAX_REVIEW_ID_LEN: usize = 300;

/// A snooze must end at least this far in the future.
pub const MIN_SNOOZE_SECS: i64 = 60;

/// Snooze length used when the client doesn't pick one.
pub const DEFAULT_SNOOZE_SECS: i64 = 86_400;

fn validate_id(id: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        return Err(AppError::invalid_input_field("Code review id is empty", "codeReviewId"));
    }
    if id.len() > MAX_REVIEW_ID_LEN {
        return Err(AppError::invalid_input_field(
            format!("Code review id longer than {} characters", MAX_REVIEW_ID_LEN),
            "codeReviewId",
        ));
    }
    Ok(())
}

/// Apply `mutate` to the stored review, stamp `last_changed` and remember the id
/// as the last visited review.
async fn transition<F>(store: &ReviewStore, id: &str, mutate: F) -> Result<CodeReview, AppError>
where
    F: FnOnce(&mut CodeReview, i64),
{
    validate_id(id)?;

    let review = store
        .update(id, |review| {
            let now = now();
            mutate(review, now);
            review.last_changed = review.last_changed.max(now);
            Ok(())
        })
        .await?;

    // The record is already committed; failing here would only hide that.
    if let Err(e) = store.set_last_visited_review(id).await {
        log::warn!("[commands] Could not record {} as last visited: {}", id, e);
    }

    Ok(review)
}

pub async fn snooze_until_time(
    store: &ReviewStore,
    id: &str,
    until: i64,
) -> Result<CodeReview, AppError> {
    let earliest = now() + MIN_SNOOZE_SECS;
    if until <= earliest {
        return Err(AppError::invalid_input_field(
            "Snooze time must be more than a minute in the future",
            "until",
        ));
    }

    log::info!("[commands] Snoozing {} until {}", id, until);
    transition(store, id, |review, _| {
        review.status = CodeReviewStatus::SnoozedUntilTime;
        review.snooze_until_timestamp = until;
    })
    .await
}

pub async fn snooze_until_mentioned(store: &ReviewStore, id: &str) -> Result<CodeReview, AppError> {
    log::info!("[commands] Snoozing {} until mentioned", id);
    transition(store, id, |review, _| {
        review.status = CodeReviewStatus::SnoozedUntilMentioned;
    })
    .await
}

/// Snooze until the PR's remote updated-at moves.
///
/// The user has often just acted on the PR (commented, pushed, re-ran CI), so
/// the stored updated-at is refreshed first. Otherwise the very next refresh
/// would see the user's own change and unsnooze right away.
pub async fn snooze_until_update(engine: &SyncEngine, id: &str) -> Result<CodeReview, AppError> {
    validate_id(id)?;
    engine.refresh_one(id).await?;

    let store = engine.store();
    transition(store, id, |review, _| {
        let baseline = review.remote_fields.updated_at;
        log::info!(
            "[commands] Snoozing {} until updated-at changes from {}",
            review.id,
            baseline
        );
        review.status = CodeReviewStatus::SnoozedUntilUpdate;
        review.snooze_until_updated_at_changed_from = baseline;
    })
    .await
}

pub async fn mark_must_review(store: &ReviewStore, id: &str) -> Result<CodeReview, AppError> {
    log::info!("[commands] Marking {} as must-review", id);
    transition(store, id, |review, _| {
        review.status = CodeReviewStatus::MustReview;
    })
    .await
}

/// Mark reviewed: the PR disappears once merged, or comes back if it isn't
/// merged within the grace window.
pub async fn mark_reviewed_delete_on_merge(
    store: &ReviewStore,
    id: &str,
) -> Result<CodeReview, AppError> {
    log::info!("[commands] Marking {} as reviewed-delete-on-merge", id);
    transition(store, id, |review, now| {
        review.status = CodeReviewStatus::ReviewedDeleteOnMerge;
        review.bring_back_to_review_if_not_merged_until_timestamp = now + REVIEW_GRACE_WINDOW_SECS;
    })
    .await
}

pub async fn mark_visited(store: &ReviewStore, id: &str) -> Result<CodeReview, AppError> {
    log::debug!("[commands] Marking {} as visited", id);
    transition(store, id, |review, now| {
        review.last_visited = review.last_visited.max(now);
    })
    .await
}

/// Hide a review. The record is kept so searches can't bring it back as new.
pub async fn delete(store: &ReviewStore, id: &str) -> Result<CodeReview, AppError> {
    log::info!("[commands] Marking {} as deleted", id);
    transition(store, id, |review, now| {
        review.status = CodeReviewStatus::Deleted;
        review.delete_after = now + DELETION_RETENTION_SECS;
    })
    .await
}
