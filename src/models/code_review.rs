//! Code review record: the persisted workflow state of one tracked PR.

use super::pull_request::{CheckStatus, PullRequestLocator, PullRequestState};
use serde::{Deserialize, Serialize};

/// Workflow status of a code review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeReviewStatus {
    /// Seen for the first time, no user decision yet.
    New,
    /// Someone mentioned a configured trigger in a recent comment.
    Mentioned,
    MustReview,
    Merged,
    Closed,
    /// Hidden by the user, kept until `delete_after` so searches can't resurrect it.
    Deleted,
    Archived,
    /// Reviewed; delete once merged, bring back if it doesn't merge in time.
    ReviewedDeleteOnMerge,
    SnoozedUntilTime,
    /// Someone else handles the review.
    SnoozedUntilMentioned,
    // `snoozed` is what this status was called before the snooze variants split up.
    // A legacy record without an updated-at baseline unsnoozes on its next refresh.
    #[serde(alias = "snoozed")]
    SnoozedUntilUpdate,
    UpdatedAfterSnooze,
}

impl CodeReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Mentioned => "MENTIONED",
            Self::MustReview => "MUST_REVIEW",
            Self::Merged => "MERGED",
            Self::Closed => "CLOSED",
            Self::Deleted => "DELETED",
            Self::Archived => "ARCHIVED",
            Self::ReviewedDeleteOnMerge => "REVIEWED_DELETE_ON_MERGE",
            Self::SnoozedUntilTime => "SNOOZED_UNTIL_TIME",
            Self::SnoozedUntilMentioned => "SNOOZED_UNTIL_MENTIONED",
            Self::SnoozedUntilUpdate => "SNOOZED_UNTIL_UPDATE",
            Self::UpdatedAfterSnooze => "UPDATED_AFTER_SNOOZE",
        }
    }
}

impl std::fmt::Display for CodeReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known remote state needed for display and reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFields {
    pub url: String,
    pub title: String,
    pub number: u64,
    pub owner: String,
    pub repo: String,
    pub state: PullRequestState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_status: Option<CheckStatus>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub auto_merge: bool,
    /// Remote updated-at (Unix).
    pub updated_at: i64,
}

/// Derived fields, recomputed from the snapshot on every reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFields {
    pub author_is_self: bool,
    pub author_login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_avatar_url: Option<String>,
}

/// One tracked pull request.
///
/// All timestamps are Unix seconds; `0` means unknown or never.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeReview {
    /// Canonical PR URL. Never changes for the lifetime of the record.
    pub id: String,
    pub status: CodeReviewStatus,
    pub remote_fields: RemoteFields,
    #[serde(default)]
    pub render_fields: RenderFields,

    #[serde(default)]
    pub last_changed: i64,
    #[serde(default)]
    pub last_refreshed: i64,
    #[serde(default)]
    pub last_mention: i64,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default)]
    pub last_visited: i64,
    #[serde(default)]
    pub delete_after: i64,

    // Only meaningful while `status` is a snooze variant (or reviewed-delete-on-merge).
    #[serde(default)]
    pub snooze_until_timestamp: i64,
    #[serde(default)]
    pub snooze_until_updated_at_changed_from: i64,
    #[serde(default)]
    pub bring_back_to_review_if_not_merged_until_timestamp: i64,
}

impl CodeReview {
    /// Where to fetch this review's PR from.
    pub fn locator(&self) -> PullRequestLocator {
        PullRequestLocator {
            owner: self.remote_fields.owner.clone(),
            repo: self.remote_fields.repo.clone(),
            number: self.remote_fields.number,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.status == CodeReviewStatus::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&CodeReviewStatus::ReviewedDeleteOnMerge).unwrap();
        assert_eq!(json, "\"REVIEWED_DELETE_ON_MERGE\"");
        assert_eq!(
            CodeReviewStatus::SnoozedUntilTime.to_string(),
            "SNOOZED_UNTIL_TIME"
        );
    }

    #[test]
    fn test_legacy_snoozed_status_migrates() {
        let status: CodeReviewStatus = serde_json::from_str("\"snoozed\"").unwrap();
        assert_eq!(status, CodeReviewStatus::SnoozedUntilUpdate);
    }

    #[test]
    fn test_record_defaults_missing_timestamps() {
        let json = r#"{
            "id": "https://github.com/o/r/pull/3",
            "status": "MUST_REVIEW",
            "remoteFields": {
                "url": "https://github.com/o/r/pull/3",
                "title": "Fix it",
                "number": 3,
                "owner": "o",
                "repo": "r",
                "state": "open",
                "updatedAt": 1701427555
            },
            "lastChanged": 1701427555
        }"#;

        let review: CodeReview = serde_json::from_str(json).unwrap();
        assert_eq!(review.status, CodeReviewStatus::MustReview);
        assert_eq!(review.last_changed, 1_701_427_555);
        assert_eq!(review.last_visited, 0);
        assert_eq!(review.snooze_until_timestamp, 0);
        assert!(!review.remote_fields.draft);
        assert_eq!(review.locator().to_string(), "o/r#3");
    }
}
