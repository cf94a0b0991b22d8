//! Data models for the application.
//!
//! `code_review` holds the persisted workflow records; `pull_request` holds
//! what the remote platform reports. Both serialize as JSON for the store and
//! the RPC layer.

pub mod code_review;
pub mod pull_request;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-exports for convenient access
pub use code_review::{CodeReview, CodeReviewStatus, RemoteFields, RenderFields};
pub use pull_request::{
    CheckStatus, PullRequestLocator, PullRequestState, RemoteAuthor, RemoteComment,
    RemoteSnapshot, SearchHit, SearchPage,
};

/// Current Unix time in seconds. All record timestamps use this clock.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
