//! Reconciliation of a fresh remote snapshot with a stored code review.
//!
//! `reconcile` is pure: it never touches the store or the network. The status
//! rules run in a fixed order and each rule's guard sees the status left by the
//! rules before it, so one call always lands on a fixed point:
//!
//! 1. first sighting creates a `NEW` record and stops
//! 2. a fresh mention resurrects any record (unless the repo is archived)
//! 3. merged: `MERGED`, or `DELETED` if it was reviewed-delete-on-merge
//! 4. reviewed-delete-on-merge past its grace window goes back to `MUST_REVIEW`
//! 5. closed: `CLOSED`
//! 6. snoozed-until-time past its deadline: `MUST_REVIEW`
//! 7. snoozed-until-update with a changed remote updated-at: `UPDATED_AFTER_SNOOZE`
//! 8. archived repository: `ARCHIVED`
//!
//! A `DELETED` record only reacts to rule 2.

use crate::models::{
    CodeReview, CodeReviewStatus, RemoteFields, RemoteSnapshot, RenderFields,
};
use crate::models::PullRequestState;

/// Mentions older than this on a PR that isn't open are ignored, so importing an
/// old closed thread doesn't show up as "just mentioned".
pub const MENTION_SUPPRESSION_WINDOW_SECS: i64 = 14 * 86_400;

/// How long a reviewed-delete-on-merge PR may stay unmerged before it comes back.
pub const REVIEW_GRACE_WINDOW_SECS: i64 = 4 * 3_600;

/// How long a deleted record is retained.
pub const DELETION_RETENTION_SECS: i64 = 30 * 86_400;

/// Inputs to a reconciliation that don't come from the PR itself.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileContext<'a> {
    /// Current Unix time.
    pub now: i64,
    /// Login of the user running the board.
    pub self_login: &'a str,
    /// Substrings that count as a mention, matched case-sensitively.
    pub mention_triggers: &'a [String],
}

/// Time of the most recent comment containing a trigger, if it still counts.
pub fn latest_mention(remote: &RemoteSnapshot, ctx: &ReconcileContext<'_>) -> Option<i64> {
    let latest = remote
        .comments
        .iter()
        .filter(|comment| {
            ctx.mention_triggers
                .iter()
                .filter(|trigger| !trigger.is_empty())
                .any(|trigger| comment.body.contains(trigger.as_str()))
        })
        .map(|comment| comment.effective_time())
        .max()?;

    if remote.state != PullRequestState::Open
        && ctx.now - latest > MENTION_SUPPRESSION_WINDOW_SECS
    {
        return None;
    }

    Some(latest)
}

fn remote_fields(remote: &RemoteSnapshot) -> RemoteFields {
    RemoteFields {
        url: remote.url.clone(),
        title: remote.title.clone(),
        number: remote.locator.number,
        owner: remote.locator.owner.clone(),
        repo: remote.locator.repo.clone(),
        state: remote.state,
        check_status: remote.check_status,
        draft: remote.draft,
        auto_merge: remote.auto_merge,
        updated_at: remote.updated_at,
    }
}

fn render_fields(remote: &RemoteSnapshot, self_login: &str) -> RenderFields {
    RenderFields {
        author_is_self: !self_login.is_empty() && remote.author.login == self_login,
        author_login: remote.author.login.clone(),
        author_avatar_url: remote.author.avatar_url.clone(),
    }
}

/// Merge `remote` into `existing` and return the new authoritative record.
pub fn reconcile(
    remote: &RemoteSnapshot,
    existing: Option<&CodeReview>,
    ctx: &ReconcileContext<'_>,
) -> CodeReview {
    let Some(existing) = existing else {
        return CodeReview {
            id: remote.url.clone(),
            status: CodeReviewStatus::New,
            remote_fields: remote_fields(remote),
            render_fields: render_fields(remote, ctx.self_login),
            last_changed: remote.updated_at,
            last_refreshed: ctx.now,
            // left for the next refresh, which applies the mention rule
            last_mention: 0,
            last_updated: remote.updated_at,
            last_visited: 0,
            delete_after: 0,
            snooze_until_timestamp: 0,
            snooze_until_updated_at_changed_from: 0,
            bring_back_to_review_if_not_merged_until_timestamp: 0,
        };
    };

    let now = ctx.now;
    let mention = latest_mention(remote, ctx);
    let mut review = existing.clone();
    review.remote_fields = remote_fields(remote);
    review.render_fields = render_fields(remote, ctx.self_login);
    review.last_updated = remote.updated_at;

    let mut touched = false;

    if let Some(mentioned_at) = mention {
        if mentioned_at > existing.last_mention && !remote.repository_archived {
            log::info!(
                "[reconcile] Marking {} as mentioned (was {})",
                review.id,
                review.status
            );
            review.status = CodeReviewStatus::Mentioned;
            review.last_mention = mentioned_at;
            review.delete_after = 0;
            touched = true;
        }
    }

    let frozen = existing.status == CodeReviewStatus::Deleted
        || (existing.status == CodeReviewStatus::Archived && remote.repository_archived);

    if !frozen {
        touched |= apply_status_rules(&mut review, remote, now);
    }

    review.last_changed = if touched {
        now.max(existing.last_changed)
    } else {
        existing.last_changed
    };
    review.last_refreshed = existing.last_refreshed.max(now);
    review.last_mention = review.last_mention.max(mention.unwrap_or(0));
    review.last_visited = existing.last_visited;

    review
}

/// Rules 3 to 8. Returns whether any of them changed the record.
fn apply_status_rules(review: &mut CodeReview, remote: &RemoteSnapshot, now: i64) -> bool {
    use CodeReviewStatus::*;

    let mut touched = false;

    if !matches!(review.status, Deleted | Merged | Mentioned)
        && remote.state == PullRequestState::Merged
    {
        if review.status == ReviewedDeleteOnMerge {
            log::info!("[reconcile] Marking {} as deleted because it was merged", review.id);
            review.status = Deleted;
            review.delete_after = now + DELETION_RETENTION_SECS;
        } else {
            log::info!("[reconcile] Marking {} as merged", review.id);
            review.status = Merged;
        }
        touched = true;
    }

    if review.status == ReviewedDeleteOnMerge
        && review.bring_back_to_review_if_not_merged_until_timestamp <= now
    {
        log::info!(
            "[reconcile] {} was not merged within the grace window, marking as must-review",
            review.id
        );
        review.status = MustReview;
        review.bring_back_to_review_if_not_merged_until_timestamp = 0;
        touched = true;
    }

    if !matches!(review.status, Deleted | Closed | Mentioned)
        && remote.state == PullRequestState::Closed
    {
        log::info!("[reconcile] Marking {} as closed", review.id);
        review.status = Closed;
        touched = true;
    }

    if review.status == SnoozedUntilTime && review.snooze_until_timestamp <= now {
        log::info!("[reconcile] Snooze time of {} passed, unsnoozing it", review.id);
        review.status = MustReview;
        review.snooze_until_timestamp = 0;
        touched = true;
    }

    if review.status == SnoozedUntilUpdate
        && remote.updated_at != 0
        && remote.updated_at != review.snooze_until_updated_at_changed_from
    {
        log::info!(
            "[reconcile] Snoozed {} was updated ({} -> {}), unsnoozing it",
            review.id,
            review.snooze_until_updated_at_changed_from,
            remote.updated_at
        );
        review.status = UpdatedAfterSnooze;
        review.snooze_until_updated_at_changed_from = 0;
        touched = true;
    }

    if remote.repository_archived && review.status != Archived {
        log::info!("[reconcile] Marking {} as archived", review.id);
        review.status = Archived;
        touched = true;
    }

    touched
}
