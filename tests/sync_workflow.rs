//! End-to-end sync workflow against an in-memory remote.
//!
//! Discovery picks up a new PR, a refresh follows it through merge, and the
//! user's workflow state survives refreshes in between.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use workboard_lib::commands::review;
use workboard_lib::db;
use workboard_lib::db::kv::SqliteKvStore;
use workboard_lib::error::AppError;
use workboard_lib::models::{
    now, CodeReviewStatus, PullRequestLocator, PullRequestState, RemoteAuthor, RemoteComment,
    RemoteSnapshot, SearchHit, SearchPage,
};
use workboard_lib::services::remote::RemoteSource;
use workboard_lib::services::sync_engine::SyncConfig;
use workboard_lib::services::{ReviewStore, SyncEngine};

const PR_URL: &str = "https://example/o/r/pull/7";

/// Remote whose PRs the test edits between calls. Search returns all of them,
/// like a search index that lags behind merges.
#[derive(Default)]
struct ScriptedRemote {
    prs: Mutex<HashMap<u64, RemoteSnapshot>>,
}

impl ScriptedRemote {
    fn set(&self, snapshot: RemoteSnapshot) {
        self.prs.lock().unwrap().insert(snapshot.locator.number, snapshot);
    }

    fn edit(&self, number: u64, f: impl FnOnce(&mut RemoteSnapshot)) {
        f(self.prs.lock().unwrap().get_mut(&number).unwrap());
    }
}

#[async_trait]
impl RemoteSource for ScriptedRemote {
    async fn search_page(&self, _query: &str, _page: u32) -> Result<SearchPage, AppError> {
        let items = self
            .prs
            .lock()
            .unwrap()
            .values()
            .map(|s| SearchHit {
                id: s.url.clone(),
                locator: s.locator.clone(),
                state: s.state,
            })
            .collect();
        Ok(SearchPage {
            items,
            next_page: None,
        })
    }

    async fn fetch_snapshot(&self, locator: &PullRequestLocator) -> Result<RemoteSnapshot, AppError> {
        self.prs
            .lock()
            .unwrap()
            .get(&locator.number)
            .cloned()
            .ok_or_else(|| AppError::github_api_full("Resource not found", 404, "/repos"))
    }
}

fn open_pr() -> RemoteSnapshot {
    RemoteSnapshot {
        url: PR_URL.to_string(),
        locator: PullRequestLocator::parse_url(PR_URL).unwrap(),
        title: "Teach the parser about generics".to_string(),
        state: PullRequestState::Open,
        author: RemoteAuthor {
            login: "alice".to_string(),
            avatar_url: None,
        },
        created_at: 1_700_000_000,
        updated_at: 1_700_000_500,
        draft: false,
        auto_merge: false,
        check_status: None,
        repository_archived: false,
        comments: Vec::new(),
    }
}

async fn setup() -> (tempfile::TempDir, Arc<ScriptedRemote>, SyncEngine) {
    let dir = tempdir().unwrap();
    let pool = db::initialize(&dir.path().join("workboard.db")).await.unwrap();
    let store = Arc::new(ReviewStore::new(Arc::new(SqliteKvStore::new(pool))));
    store.set_github_user("me").await.unwrap();

    let remote = Arc::new(ScriptedRemote::default());
    let engine = SyncEngine::new(store, remote.clone(), SyncConfig::default());
    (dir, remote, engine)
}

#[tokio::test]
async fn test_discover_then_refresh_after_merge() {
    let (_dir, remote, engine) = setup().await;
    remote.set(open_pr());

    let report = engine.discover().await.unwrap();
    assert_eq!(report.discovered, vec![PR_URL.to_string()]);

    let reviews = engine.store().list().await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].status, CodeReviewStatus::New);
    assert_eq!(reviews[0].last_changed, 1_700_000_500);

    remote.edit(7, |pr| {
        pr.state = PullRequestState::Merged;
        pr.updated_at += 60;
    });

    let before = now();
    let report = engine.refresh(&[PR_URL.to_string()]).await.unwrap();
    assert!(report.failures.is_empty());

    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::Merged);
    assert!(stored.last_changed >= before);
    assert!(stored.last_refreshed >= before);
    assert_eq!(stored.remote_fields.state, PullRequestState::Merged);
}

#[tokio::test]
async fn test_reviewed_pr_is_deleted_on_merge() {
    let (_dir, remote, engine) = setup().await;
    remote.set(open_pr());
    engine.discover().await.unwrap();

    review::mark_reviewed_delete_on_merge(engine.store(), PR_URL)
        .await
        .unwrap();

    // unchanged remote: still waiting for the merge
    engine.refresh(&[PR_URL.to_string()]).await.unwrap();
    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::ReviewedDeleteOnMerge);

    remote.edit(7, |pr| pr.state = PullRequestState::Merged);
    let before = now();
    engine.refresh(&[PR_URL.to_string()]).await.unwrap();

    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::Deleted);
    assert!(stored.delete_after >= before + 30 * 86_400);

    // deleted records are kept, so discovery doesn't bring them back
    let report = engine.discover().await.unwrap();
    assert!(report.discovered.is_empty());
}

#[tokio::test]
async fn test_snooze_until_update_uses_fresh_baseline() {
    let (_dir, remote, engine) = setup().await;
    remote.set(open_pr());
    engine.discover().await.unwrap();

    // the user comments right before snoozing
    remote.edit(7, |pr| pr.updated_at = 1_700_001_000);

    let snoozed = review::snooze_until_update(&engine, PR_URL).await.unwrap();
    assert_eq!(snoozed.status, CodeReviewStatus::SnoozedUntilUpdate);
    assert_eq!(snoozed.snooze_until_updated_at_changed_from, 1_700_001_000);

    engine.refresh(&[PR_URL.to_string()]).await.unwrap();
    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::SnoozedUntilUpdate);

    remote.edit(7, |pr| pr.updated_at = 1_700_002_000);
    engine.refresh(&[PR_URL.to_string()]).await.unwrap();
    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::UpdatedAfterSnooze);
    assert_eq!(stored.snooze_until_updated_at_changed_from, 0);
}

#[tokio::test]
async fn test_mention_wakes_snoozed_review() {
    let (_dir, remote, engine) = setup().await;
    remote.set(open_pr());
    engine.discover().await.unwrap();

    review::snooze_until_mentioned(engine.store(), PR_URL)
        .await
        .unwrap();

    remote.edit(7, |pr| {
        pr.comments.push(RemoteComment {
            author_login: "bob".to_string(),
            body: "@me could you take a look?".to_string(),
            created_at: now() - 30,
            last_edited_at: None,
        })
    });
    engine.refresh(&[PR_URL.to_string()]).await.unwrap();

    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::Mentioned);
    assert!(stored.last_mention > 0);

    // the same comment doesn't fire twice
    review::mark_must_review(engine.store(), PR_URL).await.unwrap();
    engine.refresh(&[PR_URL.to_string()]).await.unwrap();
    let stored = engine.store().get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::MustReview);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("workboard.db");

    {
        let pool = db::initialize(&db_path).await.unwrap();
        let store = Arc::new(ReviewStore::new(Arc::new(SqliteKvStore::new(pool.clone()))));
        store.set_github_user("me").await.unwrap();
        let remote = Arc::new(ScriptedRemote::default());
        remote.set(open_pr());
        let engine = SyncEngine::new(store, remote, SyncConfig::default());
        engine.discover().await.unwrap();
        review::delete(engine.store(), PR_URL).await.unwrap();
        pool.close().await;
    }

    let pool = db::initialize(&db_path).await.unwrap();
    let store = ReviewStore::new(Arc::new(SqliteKvStore::new(pool)));
    let stored = store.get(PR_URL).await.unwrap();
    assert_eq!(stored.status, CodeReviewStatus::Deleted);
    assert_eq!(store.last_visited_review().await.unwrap().as_deref(), Some(PR_URL));
}
