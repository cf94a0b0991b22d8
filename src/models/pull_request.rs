//! Remote pull request data as fetched from the hosting platform.

use serde::{Deserialize, Serialize};

/// State of a pull request on the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl From<&str> for PullRequestState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }
}

impl std::fmt::Display for PullRequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// Rollup of all status checks on the head commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Success,
    Failure,
    Error,
    Expected,
}

impl CheckStatus {
    /// Parse a GraphQL `StatusState` value.
    pub fn from_graphql(state: &str) -> Option<Self> {
        match state {
            "PENDING" => Some(Self::Pending),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            "ERROR" => Some(Self::Error),
            "EXPECTED" => Some(Self::Expected),
            _ => None,
        }
    }
}

/// Owner/repo/number address of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestLocator {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestLocator {
    /// Parse a PR web URL of the form `https://<host>/<owner>/<repo>/pull/<number>`.
    pub fn parse_url(url: &str) -> Option<Self> {
        let after_scheme = url.split_once("://")?.1;
        let path = after_scheme.split_once('/')?.1;
        let mut segments = path.split('/');

        let owner = segments.next().filter(|s| !s.is_empty())?;
        let repo = segments.next().filter(|s| !s.is_empty())?;
        if segments.next()? != "pull" {
            return None;
        }
        let number: u64 = segments.next()?.parse().ok()?;
        if number == 0 {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            number,
        })
    }
}

impl std::fmt::Display for PullRequestLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Author of a pull request or comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteAuthor {
    pub login: String,
    pub avatar_url: Option<String>,
}

/// One comment from the tail of a PR's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteComment {
    pub author_login: String,
    pub body: String,
    pub created_at: i64,
    /// `None` if the comment was never edited.
    pub last_edited_at: Option<i64>,
}

impl RemoteComment {
    /// Time the comment got its current text.
    pub fn effective_time(&self) -> i64 {
        self.last_edited_at.unwrap_or(self.created_at)
    }
}

/// Everything the reconciliation needs to know about a PR right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Canonical PR web URL, used as the review id.
    pub url: String,
    pub locator: PullRequestLocator,
    pub title: String,
    pub state: PullRequestState,
    pub author: RemoteAuthor,
    pub created_at: i64,
    pub updated_at: i64,
    pub draft: bool,
    pub auto_merge: bool,
    pub check_status: Option<CheckStatus>,
    pub repository_archived: bool,
    /// Most recent comments, oldest first.
    pub comments: Vec<RemoteComment>,
}

/// One pull request returned by a search query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub locator: PullRequestLocator,
    pub state: PullRequestState,
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub items: Vec<SearchHit>,
    /// Next page number, `None` on the last page.
    pub next_page: Option<u32>,
}

/// Parse ISO 8601 timestamp to Unix timestamp.
pub fn parse_iso_timestamp(s: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}
