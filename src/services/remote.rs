//! Remote platform abstraction and search pagination.

use crate::error::AppError;
use crate::models::{PullRequestLocator, RemoteSnapshot, SearchHit, SearchPage};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Read-only access to the code-hosting platform.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch one page (1-based) of pull requests matching `query`.
    async fn search_page(&self, query: &str, page: u32) -> Result<SearchPage, AppError>;

    /// Fetch the full current state of one pull request.
    async fn fetch_snapshot(&self, locator: &PullRequestLocator)
        -> Result<RemoteSnapshot, AppError>;
}

/// What to do when a search page fails mid-query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationPolicy {
    /// Drop everything collected for the query and report the error.
    #[default]
    AbortQuery,
    /// Keep the hits from the pages that succeeded and report the error.
    KeepPartial,
}

/// Lazy page-by-page cursor over a search query.
///
/// Nothing is fetched until [`SearchPager::next_page`] is called. After a
/// failure the pager stays on the failed page, so calling `next_page` again
/// retries it; [`SearchPager::restart`] goes back to page 1.
pub struct SearchPager<'a> {
    remote: &'a dyn RemoteSource,
    query: String,
    next: Option<u32>,
    max_pages: u32,
    fetched: u32,
}

impl<'a> SearchPager<'a> {
    pub fn new(remote: &'a dyn RemoteSource, query: impl Into<String>, max_pages: u32) -> Self {
        Self {
            remote,
            query: query.into(),
            next: Some(1),
            max_pages,
            fetched: 0,
        }
    }

    /// Fetch the next page. `Ok(None)` once the query is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<SearchHit>>, AppError> {
        let Some(page) = self.next else {
            return Ok(None);
        };
        if self.fetched >= self.max_pages {
            log::warn!(
                "[sync] Query '{}' stopped after {} pages",
                self.query,
                self.fetched
            );
            self.next = None;
            return Ok(None);
        }

        let result = self.remote.search_page(&self.query, page).await?;
        self.fetched += 1;
        // Guard against a platform that keeps pointing at the same page.
        self.next = result.next_page.filter(|&n| n > page);
        Ok(Some(result.items))
    }

    pub fn restart(&mut self) {
        self.next = Some(1);
        self.fetched = 0;
    }

    /// Drain every page, applying `policy` on failure.
    ///
    /// Returns the hits and the error that ended the query early, if any.
    pub async fn collect(&mut self, policy: PaginationPolicy) -> (Vec<SearchHit>, Option<AppError>) {
        let mut hits = Vec::new();
        loop {
            match self.next_page().await {
                Ok(Some(items)) => hits.extend(items),
                Ok(None) => return (hits, None),
                Err(e) => {
                    return match policy {
                        PaginationPolicy::AbortQuery => (Vec::new(), Some(e)),
                        PaginationPolicy::KeepPartial => (hits, Some(e)),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PullRequestState;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Three pages of one hit each; page `fail_on` errors.
    struct PagedRemote {
        fail_on: Option<u32>,
        calls: AtomicU32,
    }

    fn hit(n: u64) -> SearchHit {
        SearchHit {
            id: format!("https://github.com/o/r/pull/{}", n),
            locator: PullRequestLocator {
                owner: "o".to_string(),
                repo: "r".to_string(),
                number: n,
            },
            state: PullRequestState::Open,
        }
    }

    #[async_trait]
    impl RemoteSource for PagedRemote {
        async fn search_page(&self, _query: &str, page: u32) -> Result<SearchPage, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(page) {
                return Err(AppError::github_api_full("boom", 502, "/search/issues"));
            }
            Ok(SearchPage {
                items: vec![hit(page as u64)],
                next_page: if page < 3 { Some(page + 1) } else { None },
            })
        }

        async fn fetch_snapshot(
            &self,
            locator: &PullRequestLocator,
        ) -> Result<RemoteSnapshot, AppError> {
            Err(AppError::not_found_with_id("PullRequest", locator.to_string()))
        }
    }

    fn remote(fail_on: Option<u32>) -> PagedRemote {
        PagedRemote {
            fail_on,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_pager_is_lazy() {
        let remote = remote(None);
        let mut pager = SearchPager::new(&remote, "is:pr", 10);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);

        let first = pager.next_page().await.unwrap().unwrap();
        assert_eq!(first, vec![hit(1)]);
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_all_pages() {
        let remote = remote(None);
        let mut pager = SearchPager::new(&remote, "is:pr", 10);
        let (hits, err) = pager.collect(PaginationPolicy::AbortQuery).await;
        assert!(err.is_none());
        assert_eq!(hits.len(), 3);
        assert!(pager.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_page_cap() {
        let remote = remote(None);
        let mut pager = SearchPager::new(&remote, "is:pr", 2);
        let (hits, err) = pager.collect(PaginationPolicy::AbortQuery).await;
        assert!(err.is_none());
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_policies() {
        let remote = remote(Some(2));

        let mut pager = SearchPager::new(&remote, "is:pr", 10);
        let (hits, err) = pager.collect(PaginationPolicy::AbortQuery).await;
        assert!(hits.is_empty());
        assert!(err.unwrap().is_upstream());

        let mut pager = SearchPager::new(&remote, "is:pr", 10);
        let (hits, err) = pager.collect(PaginationPolicy::KeepPartial).await;
        assert_eq!(hits, vec![hit(1)]);
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn test_restart() {
        let remote = remote(None);
        let mut pager = SearchPager::new(&remote, "is:pr", 10);
        pager.collect(PaginationPolicy::AbortQuery).await;

        pager.restart();
        let first = pager.next_page().await.unwrap().unwrap();
        assert_eq!(first, vec![hit(1)]);
    }
}
