//! Sync orchestrator: discovery of new pull requests and refresh of tracked ones.
//!
//! This module provides:
//! - Discovery over the saved search queries, inserting only unknown PRs
//! - Refresh of up to [`MAX_REFRESH_BATCH`] reviews per call
//! - A background loop that runs both on an interval or on demand
//!
//! Remote calls always happen before the store lock is taken; the reconcile
//! step runs inside [`ReviewStore::update`] against the freshly reloaded record.

use crate::error::AppError;
use crate::models::{now, CodeReview};
use crate::services::reconcile::{reconcile, ReconcileContext};
use crate::services::remote::{PaginationPolicy, RemoteSource, SearchPager};
use crate::services::review_store::ReviewStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::pending;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{self, Interval};

/// Default sync interval in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Most reviews a single refresh call accepts.
pub const MAX_REFRESH_BATCH: usize = 20;

/// Upper bound on one remote call, on top of the client's own timeout.
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 10;

/// Search queries whose results are tracked on the board.
pub fn discovery_queries(user: &str) -> Vec<String> {
    ["author", "assignee", "review-requested", "reviewed-by"]
        .iter()
        .map(|qualifier| format!("{}:\"{}\" is:pr is:open archived:false", qualifier, user))
        .collect()
}

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Background sync interval in seconds. `0` disables the timer.
    pub interval_secs: u64,

    /// What to do with a query whose search pages fail halfway.
    pub pagination_policy: PaginationPolicy,

    /// Page cap per search query.
    pub max_search_pages: u32,

    /// Timeout applied to every remote call.
    pub remote_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            pagination_policy: PaginationPolicy::AbortQuery,
            max_search_pages: 10,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    /// Ids inserted by this pass.
    pub discovered: Vec<String>,
    /// Search hits that were already tracked.
    pub already_known: usize,
    /// One line per query that failed or was cut short.
    pub errors: Vec<String>,
}

/// A review that could not be refreshed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshFailure {
    pub id: String,
    pub error: AppError,
}

/// Outcome of a refresh call.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub refreshed: Vec<CodeReview>,
    pub failures: Vec<RefreshFailure>,
}

impl RefreshReport {
    fn merge(&mut self, other: RefreshReport) {
        self.refreshed.extend(other.refreshed);
        self.failures.extend(other.failures);
    }
}

/// Status of the background sync loop.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether sync is currently running.
    pub is_syncing: bool,

    /// Last completed sync timestamp.
    pub last_sync_time: Option<i64>,

    /// Errors of the last sync joined into one message.
    pub last_error: Option<String>,

    /// Reviews discovered in the last run.
    pub last_discovered: usize,

    /// Reviews refreshed in the last run.
    pub last_refreshed: usize,
}

/// Result of a full sync run.
#[derive(Debug)]
pub struct SyncResult {
    pub discovered: usize,
    pub refreshed: usize,
    pub errors: Vec<String>,
    pub duration_ms: i64,
}

/// Commands that can be sent to the sync loop.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a sync now.
    TriggerSync,

    /// Stop the sync loop.
    Stop,
}

/// Lightweight handle for controlling the background sync loop.
#[derive(Clone)]
pub struct SyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncHandle {
    async fn send(&self, command: SyncCommand) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Trigger an immediate sync.
    pub async fn trigger_sync(&self) -> Result<(), AppError> {
        self.send(SyncCommand::TriggerSync).await
    }

    /// Stop the loop. It finishes a sync already in progress first.
    pub async fn stop(&self) -> Result<(), AppError> {
        self.send(SyncCommand::Stop).await
    }

    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }
}

/// A storage failure while writing freshly fetched data.
fn persist_error(err: AppError, id: &str) -> AppError {
    match err {
        AppError::Storage { message, .. } => {
            log::error!("[sync] Fetched {} but could not store it: {}", id, message);
            AppError::persist_after_fetch(message, id)
        }
        other => other,
    }
}

fn make_interval(secs: u64) -> Option<Interval> {
    (secs > 0).then(|| {
        let mut interval = time::interval(Duration::from_secs(secs));
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        interval
    })
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

/// Discovery and refresh of code reviews against a remote source.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<ReviewStore>,
    remote: Arc<dyn RemoteSource>,
    config: Arc<RwLock<SyncConfig>>,
    status: Arc<RwLock<SyncStatus>>,
}

impl SyncEngine {
    pub fn new(store: Arc<ReviewStore>, remote: Arc<dyn RemoteSource>, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config: Arc::new(RwLock::new(config)),
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    pub fn store(&self) -> &Arc<ReviewStore> {
        &self.store
    }

    async fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.config.read().await.remote_timeout_secs)
    }

    /// Run every discovery query and insert the PRs we don't track yet.
    ///
    /// Known PRs are never re-fetched here. A failed detail fetch stops the
    /// rest of its query; records inserted before it stay.
    pub async fn discover(&self) -> Result<DiscoveryReport, AppError> {
        let user = self.store.github_user().await?.ok_or_else(|| {
            AppError::invalid_input_field("GitHub user is not configured", "githubUser")
        })?;
        let triggers = self.store.mention_triggers().await?;
        let config = self.config.read().await.clone();
        let timeout = Duration::from_secs(config.remote_timeout_secs);

        let known = self.store.known_ids().await?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut report = DiscoveryReport::default();

        for query in discovery_queries(&user) {
            let mut pager = SearchPager::new(self.remote.as_ref(), query.clone(), config.max_search_pages);
            let (hits, page_error) = pager.collect(config.pagination_policy).await;
            if let Some(e) = page_error {
                log::warn!("[sync] Search failed for query '{}': {}", query, e);
                report.errors.push(format!("Query '{}': {}", query, e));
            }

            for hit in hits {
                if !seen.insert(hit.id.clone()) {
                    continue;
                }
                if known.contains(&hit.id) {
                    report.already_known += 1;
                    continue;
                }

                let snapshot =
                    match time::timeout(timeout, self.remote.fetch_snapshot(&hit.locator)).await {
                        Ok(Ok(snapshot)) => snapshot,
                        Ok(Err(e)) => {
                            log::warn!("[sync] Failed to fetch {} for query '{}': {}", hit.id, query, e);
                            report.errors.push(format!("Query '{}', {}: {}", query, hit.id, e));
                            break;
                        }
                        Err(_) => {
                            log::warn!("[sync] Timed out fetching {} for query '{}'", hit.id, query);
                            report
                                .errors
                                .push(format!("Query '{}', {}: request timed out", query, hit.id));
                            break;
                        }
                    };

                let ctx = ReconcileContext {
                    now: now(),
                    self_login: &user,
                    mention_triggers: &triggers,
                };
                let mut review = reconcile(&snapshot, None, &ctx);
                // The search hit's URL is the id everything else is keyed by.
                review.id = hit.id.clone();

                match self.store.insert_if_absent(review).await {
                    Ok(true) => {
                        log::info!("[sync] Discovered {}", hit.id);
                        report.discovered.push(hit.id);
                    }
                    Ok(false) => report.already_known += 1,
                    Err(e) => {
                        let e = persist_error(e, &hit.id);
                        report.errors.push(format!("Query '{}', {}: {}", query, hit.id, e));
                        break;
                    }
                }
            }
        }

        log::info!(
            "[sync] Discovery complete: {} new, {} known, {} errors",
            report.discovered.len(),
            report.already_known,
            report.errors.len()
        );
        Ok(report)
    }

    /// Refresh the given reviews from the remote platform.
    ///
    /// Rejects an empty list or one longer than [`MAX_REFRESH_BATCH`]. A failure
    /// for one id is recorded in the report and doesn't stop the others.
    pub async fn refresh(&self, ids: &[String]) -> Result<RefreshReport, AppError> {
        if ids.is_empty() {
            return Err(AppError::invalid_input_field(
                "At least one code review id is required",
                "codeReviewIds",
            ));
        }
        if ids.len() > MAX_REFRESH_BATCH {
            return Err(AppError::invalid_input_field(
                format!("At most {} code reviews can be refreshed at once", MAX_REFRESH_BATCH),
                "codeReviewIds",
            ));
        }

        let mut report = RefreshReport::default();
        for id in ids {
            match self.refresh_one(id).await {
                Ok(review) => report.refreshed.push(review),
                Err(error) => {
                    log::warn!("[sync] Failed to refresh {}: {}", id, error);
                    report.failures.push(RefreshFailure {
                        id: id.clone(),
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Fetch one review's PR and reconcile it into the store.
    pub async fn refresh_one(&self, id: &str) -> Result<CodeReview, AppError> {
        let existing = self.store.get(id).await?;
        let locator = existing.locator();

        let snapshot = time::timeout(self.remote_timeout().await, self.remote.fetch_snapshot(&locator))
            .await
            .map_err(|_| AppError::network(format!("Timed out fetching {}", locator)))??;

        let user = self.store.github_user().await?.unwrap_or_default();
        let triggers = self.store.mention_triggers().await?;
        let ctx = ReconcileContext {
            now: now(),
            self_login: &user,
            mention_triggers: &triggers,
        };

        self.store
            .update(id, |current| {
                *current = reconcile(&snapshot, Some(current), &ctx);
                Ok(())
            })
            .await
            .map_err(|e| persist_error(e, id))
    }

    /// Refresh every tracked review in batches.
    ///
    /// Deleted reviews are included while their retention runs, so a new
    /// mention can still bring them back.
    pub async fn refresh_all(&self) -> Result<RefreshReport, AppError> {
        let now = now();
        let ids: Vec<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|review| !review.is_deleted() || review.delete_after > now)
            .map(|review| review.id)
            .collect();

        let mut report = RefreshReport::default();
        for batch in ids.chunks(MAX_REFRESH_BATCH) {
            report.merge(self.refresh(batch).await?);
        }
        Ok(report)
    }

    /// Discovery followed by a refresh of everything tracked.
    pub async fn run_sync(&self) -> Result<SyncResult, AppError> {
        let start = Instant::now();
        self.status.write().await.is_syncing = true;

        let mut result = SyncResult {
            discovered: 0,
            refreshed: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };

        match self.discover().await {
            Ok(report) => {
                result.discovered = report.discovered.len();
                result.errors.extend(report.errors);
            }
            Err(e) => result.errors.push(format!("Discovery: {}", e)),
        }

        match self.refresh_all().await {
            Ok(report) => {
                result.refreshed = report.refreshed.len();
                result
                    .errors
                    .extend(report.failures.iter().map(|f| format!("{}: {}", f.id, f.error)));
            }
            Err(e) => result.errors.push(format!("Refresh: {}", e)),
        }

        result.duration_ms = start.elapsed().as_millis() as i64;

        {
            let mut status = self.status.write().await;
            status.is_syncing = false;
            status.last_sync_time = Some(now());
            status.last_discovered = result.discovered;
            status.last_refreshed = result.refreshed;
            status.last_error = if result.errors.is_empty() {
                None
            } else {
                Some(result.errors.join("; "))
            };
        }

        Ok(result)
    }

    /// Start the background sync loop.
    ///
    /// The first tick fires immediately, so a sync runs right away unless the
    /// interval is `0`, in which case only `TriggerSync` runs one.
    pub fn start_background(&self) -> SyncHandle {
        let (tx, mut rx) = mpsc::channel::<SyncCommand>(16);
        let engine = self.clone();
        let handle = SyncHandle {
            command_tx: tx,
            status: self.status.clone(),
        };

        tokio::spawn(async move {
            let interval_secs = engine.config.read().await.interval_secs;
            let mut interval = make_interval(interval_secs);
            log::info!("[sync] Sync engine started, interval={}s", interval_secs);

            loop {
                tokio::select! {
                    _ = tick(&mut interval) => {
                        log::info!("[sync] Running periodic sync");
                        engine.log_run(engine.run_sync().await);
                    }
                    cmd = rx.recv() => {
                        match cmd {
                            Some(SyncCommand::TriggerSync) => {
                                log::info!("[sync] Manual sync triggered");
                                engine.log_run(engine.run_sync().await);
                            }
                            Some(SyncCommand::Stop) | None => {
                                log::info!("[sync] Sync engine stopping");
                                break;
                            }
                        }
                    }
                }
            }
            log::info!("[sync] Sync engine stopped");
        });

        handle
    }

    fn log_run(&self, result: Result<SyncResult, AppError>) {
        match result {
            Ok(r) if r.errors.is_empty() => log::info!(
                "[sync] Sync complete in {}ms: {} discovered, {} refreshed",
                r.duration_ms,
                r.discovered,
                r.refreshed
            ),
            Ok(r) => log::warn!(
                "[sync] Sync complete in {}ms with {} errors: {}",
                r.duration_ms,
                r.errors.len(),
                r.errors.join("; ")
            ),
            Err(e) => log::error!("[sync] Sync error: {}", e),
        }
    }
}
