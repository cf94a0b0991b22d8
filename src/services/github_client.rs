//! GitHub API client.
//!
//! Search and issue detail come from the REST API v3; the fields REST doesn't
//! expose cheaply (draft, auto-merge, check rollup, archived repo, recent
//! comments) come from one GraphQL query per pull request.

use crate::error::AppError;
use crate::models::pull_request::parse_iso_timestamp;
use crate::models::{
    CheckStatus, PullRequestLocator, PullRequestState, RemoteAuthor, RemoteComment,
    RemoteSnapshot, SearchHit, SearchPage,
};
use crate::services::remote::RemoteSource;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

/// Public GitHub REST endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Results per search page (GitHub's maximum).
const SEARCH_PER_PAGE: u32 = 100;

/// GitHub refuses to page past the first 1000 search results.
const SEARCH_RESULT_LIMIT: u32 = 1000;

/// How many of the most recent comments to scan for mentions.
const RECENT_COMMENTS: u32 = 20;

const EXTRA_INFO_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!, $comments: Int!) {
  repository(owner: $owner, name: $repo) {
    isArchived
    pullRequest(number: $number) {
      isDraft
      merged
      autoMergeRequest { enabledAt }
      commits(last: 1) { nodes { commit { statusCheckRollup { state } } } }
      comments(last: $comments) {
        nodes { author { login } body createdAt lastEditedAt }
      }
    }
  }
}
"#;

/// GitHub API client configuration.
#[derive(Debug, Clone)]
pub struct GitHubClientConfig {
    /// REST API root, e.g. `https://api.github.com` or `https://ghe.example/api/v3`.
    pub api_base_url: String,

    /// Personal access token. Empty means anonymous access.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitHubClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token: String::new(),
            timeout_secs: 10,
        }
    }
}

/// GitHub API client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    config: GitHubClientConfig,
}

#[derive(Debug, Deserialize)]
struct SearchIssuesResponse {
    total_count: u32,
    items: Vec<GitHubIssue>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubUser {
    login: String,
    avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubPullRequestLinks {
    merged_at: Option<String>,
}

/// Issue as returned by `/search/issues` and `/repos/{owner}/{repo}/issues/{number}`.
#[derive(Debug, Clone, Deserialize)]
struct GitHubIssue {
    html_url: String,
    #[serde(default)]
    title: String,
    state: String,
    user: Option<GitHubUser>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    draft: Option<bool>,
    pull_request: Option<GitHubPullRequestLinks>,
}

impl GitHubIssue {
    fn pull_request_state(&self) -> PullRequestState {
        let merged = self
            .pull_request
            .as_ref()
            .is_some_and(|links| links.merged_at.is_some());
        if merged {
            PullRequestState::Merged
        } else {
            PullRequestState::from(self.state.as_str())
        }
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExtraInfoData {
    repository: Option<ExtraInfoRepository>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtraInfoRepository {
    is_archived: bool,
    pull_request: Option<ExtraInfoPullRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtraInfoPullRequest {
    is_draft: bool,
    merged: bool,
    auto_merge_request: Option<serde_json::Value>,
    commits: Nodes<CommitNode>,
    comments: Nodes<CommentNode>,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct CommitNode {
    commit: CommitInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitInfo {
    status_check_rollup: Option<StatusCheckRollup>,
}

#[derive(Debug, Deserialize)]
struct StatusCheckRollup {
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    author: Option<CommentAuthor>,
    body: String,
    created_at: String,
    last_edited_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommentAuthor {
    login: String,
}

/// Extra information about a PR that REST doesn't give us.
#[derive(Debug, Default)]
struct ExtraInfo {
    repository_archived: bool,
    draft: bool,
    merged: bool,
    auto_merge: bool,
    check_status: Option<CheckStatus>,
    comments: Vec<RemoteComment>,
}

impl From<ExtraInfoRepository> for ExtraInfo {
    fn from(repo: ExtraInfoRepository) -> Self {
        let Some(pr) = repo.pull_request else {
            return Self {
                repository_archived: repo.is_archived,
                ..Default::default()
            };
        };

        let check_status = pr
            .commits
            .nodes
            .last()
            .and_then(|node| node.commit.status_check_rollup.as_ref())
            .and_then(|rollup| CheckStatus::from_graphql(&rollup.state));

        let comments = pr
            .comments
            .nodes
            .into_iter()
            .map(|c| RemoteComment {
                author_login: c.author.map(|a| a.login).unwrap_or_default(),
                body: c.body,
                created_at: parse_iso_timestamp(&c.created_at),
                last_edited_at: c.last_edited_at.as_deref().map(parse_iso_timestamp),
            })
            .collect();

        Self {
            repository_archived: repo.is_archived,
            draft: pr.is_draft,
            merged: pr.merged,
            auto_merge: pr.auto_merge_request.is_some_and(|v| !v.is_null()),
            check_status,
            comments,
        }
    }
}

impl GitHubClient {
    /// Create a new GitHub client.
    pub fn new(config: GitHubClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            header::HeaderValue::from_static("2022-11-28"),
        );

        if config.token.is_empty() {
            log::warn!(
                "[github] No token configured, anonymous access to the GitHub API is rate limited very quickly"
            );
        } else {
            let mut token_value = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
                .map_err(|_| AppError::invalid_input_field("Invalid token format", "token"))?;
            token_value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, token_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("workboard/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// GraphQL endpoint for the configured REST root.
    ///
    /// GitHub Enterprise serves REST under `/api/v3` and GraphQL under `/api/graphql`.
    fn graphql_url(&self) -> String {
        let base = self.config.api_base_url.trim_end_matches('/');
        match base.strip_suffix("/v3") {
            Some(api_root) => format!("{}/graphql", api_root),
            None => format!("{}/graphql", base),
        }
    }

    /// Map a response to `T`, or to an API error carrying status and endpoint.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)));
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        // GitHub returns errors as {"message": "...", "documentation_url": "..."}
        let body_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from));

        let message = match (status, &body_message) {
            (StatusCode::UNAUTHORIZED, _) => "GitHub token invalid or expired".to_string(),
            (StatusCode::FORBIDDEN, Some(msg)) if msg.contains("rate limit") => {
                "Rate limit exceeded".to_string()
            }
            (StatusCode::FORBIDDEN, _) => "Access denied".to_string(),
            (StatusCode::NOT_FOUND, _) => "Resource not found".to_string(),
            (StatusCode::TOO_MANY_REQUESTS, _) => "Rate limit exceeded".to_string(),
            (_, Some(msg)) => msg.clone(),
            _ => format!("Request failed ({}): {}", status_code, body),
        };

        Err(AppError::github_api_full(message, status_code, endpoint))
    }

    async fn get_issue(&self, locator: &PullRequestLocator) -> Result<GitHubIssue, AppError> {
        let endpoint = format!(
            "/repos/{}/{}/issues/{}",
            urlencoding::encode(&locator.owner),
            urlencoding::encode(&locator.repo),
            locator.number
        );
        let response = self.client.get(self.api_url(&endpoint)).send().await?;
        self.handle_response(response, &endpoint).await
    }

    async fn get_extra_info(&self, locator: &PullRequestLocator) -> Result<ExtraInfo, AppError> {
        let body = json!({
            "query": EXTRA_INFO_QUERY,
            "variables": {
                "owner": locator.owner,
                "repo": locator.repo,
                "number": locator.number,
                "comments": RECENT_COMMENTS,
            },
        });

        let response = self.client.post(self.graphql_url()).json(&body).send().await?;
        let parsed: GraphQlResponse<ExtraInfoData> =
            self.handle_response(response, "/graphql").await?;

        if let Some(err) = parsed.errors.first() {
            if parsed.data.as_ref().and_then(|d| d.repository.as_ref()).is_none() {
                return Err(AppError::github_api(format!(
                    "GraphQL query for {} failed: {}",
                    locator, err.message
                )));
            }
            log::warn!("[github] Partial GraphQL result for {}: {}", locator, err.message);
        }

        parsed
            .data
            .and_then(|d| d.repository)
            .map(ExtraInfo::from)
            .ok_or_else(|| AppError::not_found_with_id("Repository", locator.to_string()))
    }
}

fn build_snapshot(issue: GitHubIssue, locator: &PullRequestLocator, extra: ExtraInfo) -> RemoteSnapshot {
    let state = if extra.merged {
        PullRequestState::Merged
    } else {
        issue.pull_request_state()
    };
    let author = issue
        .user
        .map(|u| RemoteAuthor {
            login: u.login,
            avatar_url: u.avatar_url,
        })
        .unwrap_or_default();

    RemoteSnapshot {
        url: issue.html_url,
        locator: locator.clone(),
        title: issue.title,
        state,
        author,
        created_at: issue.created_at.as_deref().map(parse_iso_timestamp).unwrap_or(0),
        updated_at: issue.updated_at.as_deref().map(parse_iso_timestamp).unwrap_or(0),
        draft: extra.draft || issue.draft.unwrap_or(false),
        auto_merge: extra.auto_merge,
        check_status: extra.check_status,
        repository_archived: extra.repository_archived,
        comments: extra.comments,
    }
}

fn next_search_page(page: u32, total_count: u32, returned: usize) -> Option<u32> {
    let seen = page * SEARCH_PER_PAGE;
    if returned == 0 || seen >= total_count || seen >= SEARCH_RESULT_LIMIT {
        None
    } else {
        Some(page + 1)
    }
}

#[async_trait]
impl RemoteSource for GitHubClient {
    async fn search_page(&self, query: &str, page: u32) -> Result<SearchPage, AppError> {
        let endpoint = "/search/issues";
        let response = self
            .client
            .get(self.api_url(endpoint))
            .query(&[
                ("q", query.to_string()),
                ("sort", "created".to_string()),
                ("order", "desc".to_string()),
                ("per_page", SEARCH_PER_PAGE.to_string()),
                ("page", page.to_string()),
            ])
            .send()
            .await?;
        let result: SearchIssuesResponse = self.handle_response(response, endpoint).await?;

        let returned = result.items.len();
        let items = result
            .items
            .into_iter()
            .filter_map(|issue| {
                let Some(locator) = PullRequestLocator::parse_url(&issue.html_url) else {
                    log::warn!("[github] Skipping search hit with unexpected URL {}", issue.html_url);
                    return None;
                };
                Some(SearchHit {
                    state: issue.pull_request_state(),
                    id: issue.html_url,
                    locator,
                })
            })
            .collect();

        Ok(SearchPage {
            items,
            next_page: next_search_page(page, result.total_count, returned),
        })
    }

    async fn fetch_snapshot(
        &self,
        locator: &PullRequestLocator,
    ) -> Result<RemoteSnapshot, AppError> {
        log::debug!("[github] Fetching {}", locator);
        let issue = self.get_issue(locator).await?;
        if issue.pull_request.is_none() {
            return Err(AppError::invalid_input(format!("{} is an issue, not a pull request", locator)));
        }
        let extra = self.get_extra_info(locator).await?;
        Ok(build_snapshot(issue, locator, extra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(GitHubClientConfig {
            api_base_url: base.to_string(),
            token: "test-token".to_string(),
            timeout_secs: 10,
        })
        .unwrap()
    }

    #[test]
    fn test_api_url_construction() {
        let c = client("https://api.github.com/");
        assert_eq!(c.api_url("/search/issues"), "https://api.github.com/search/issues");
        assert_eq!(c.graphql_url(), "https://api.github.com/graphql");

        let ghe = client("https://ghe.example/api/v3");
        assert_eq!(ghe.graphql_url(), "https://ghe.example/api/graphql");
    }

    #[test]
    fn test_next_search_page() {
        assert_eq!(next_search_page(1, 250, 100), Some(2));
        assert_eq!(next_search_page(3, 250, 50), None);
        assert_eq!(next_search_page(1, 100, 100), None);
        assert_eq!(next_search_page(10, 5000, 100), None);
        assert_eq!(next_search_page(1, 40, 0), None);
    }

    #[test]
    fn test_issue_state_prefers_merged_at() {
        let issue: GitHubIssue = serde_json::from_value(json!({
            "html_url": "https://github.com/o/r/pull/7",
            "title": "Add feature",
            "state": "closed",
            "user": {"login": "alice", "avatar_url": "https://avatars.example/alice"},
            "updated_at": "2023-12-01T10:45:55Z",
            "pull_request": {"merged_at": "2023-12-01T10:45:55Z"}
        }))
        .unwrap();
        assert_eq!(issue.pull_request_state(), PullRequestState::Merged);
    }

    #[test]
    fn test_build_snapshot() {
        let issue: GitHubIssue = serde_json::from_value(json!({
            "html_url": "https://github.com/o/r/pull/7",
            "title": "Add feature",
            "state": "open",
            "user": {"login": "alice", "avatar_url": null},
            "created_at": "2023-11-30T10:45:55Z",
            "updated_at": "2023-12-01T10:45:55Z",
            "pull_request": {"merged_at": null}
        }))
        .unwrap();

        let data: GraphQlResponse<ExtraInfoData> = serde_json::from_value(json!({
            "data": {
                "repository": {
                    "isArchived": false,
                    "pullRequest": {
                        "isDraft": true,
                        "merged": false,
                        "autoMergeRequest": {"enabledAt": "2023-12-01T10:00:00Z"},
                        "commits": {"nodes": [{"commit": {"statusCheckRollup": {"state": "FAILURE"}}}]},
                        "comments": {"nodes": [{
                            "author": {"login": "bob"},
                            "body": "@alice ping",
                            "createdAt": "2023-12-01T10:00:00Z",
                            "lastEditedAt": null
                        }]}
                    }
                }
            }
        }))
        .unwrap();

        let extra = ExtraInfo::from(data.data.unwrap().repository.unwrap());
        let locator = PullRequestLocator::parse_url("https://github.com/o/r/pull/7").unwrap();
        let snapshot = build_snapshot(issue, &locator, extra);

        assert_eq!(snapshot.state, PullRequestState::Open);
        assert!(snapshot.draft);
        assert!(snapshot.auto_merge);
        assert_eq!(snapshot.check_status, Some(CheckStatus::Failure));
        assert_eq!(snapshot.updated_at, 1_701_427_555);
        assert_eq!(snapshot.comments.len(), 1);
        assert_eq!(snapshot.comments[0].author_login, "bob");
        assert!(snapshot.author.avatar_url.is_none());
    }

    #[test]
    fn test_extra_info_without_pull_request() {
        let repo: ExtraInfoRepository = serde_json::from_value(json!({
            "isArchived": true,
            "pullRequest": null
        }))
        .unwrap();
        let extra = ExtraInfo::from(repo);
        assert!(extra.repository_archived);
        assert!(extra.comments.is_empty());
    }
}
