//! Owner of the persisted review map and the scalar settings keys.
//!
//! All reviews live as one JSON map under a single key, so every
//! read-modify-write of that map goes through this type and holds its lock
//! for the whole load, mutate, write sequence. Listing reads without the lock.
//! Callers must never await a remote call from inside an update closure; the
//! closures are synchronous to make that impossible.

use crate::db::kv::KeyValueStore;
use crate::db::DbError;
use crate::error::AppError;
use crate::models::CodeReview;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Key of the `id -> CodeReview` map.
pub const CODE_REVIEWS_KEY: &str = "code_reviews";

/// Key of the remote login of the board's owner.
pub const GITHUB_USER_KEY: &str = "github_user";

/// Key of the list of mention trigger substrings.
pub const MENTION_TRIGGERS_KEY: &str = "mention_triggers";

/// Key of the id of the last review a command touched.
pub const LAST_VISITED_REVIEW_KEY: &str = "last_visited_review";

type ReviewMap = BTreeMap<String, CodeReview>;

fn storage_error(err: DbError, operation: &str) -> AppError {
    AppError::storage_with_op(err.to_string(), operation)
}

pub struct ReviewStore {
    kv: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl ReviewStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    async fn load_map(&self) -> Result<ReviewMap, AppError> {
        Ok(self
            .kv
            .get::<ReviewMap>(CODE_REVIEWS_KEY)
            .await
            .map_err(|e| storage_error(e, "load code_reviews"))?
            .unwrap_or_default())
    }

    async fn save_map(&self, map: &ReviewMap) -> Result<(), AppError> {
        self.kv
            .set(CODE_REVIEWS_KEY, map)
            .await
            .map_err(|e| storage_error(e, "save code_reviews"))
    }

    /// All known reviews, deleted ones included.
    pub async fn list(&self) -> Result<Vec<CodeReview>, AppError> {
        Ok(self.load_map().await?.into_values().collect())
    }

    /// Ids of all known reviews.
    pub async fn known_ids(&self) -> Result<HashSet<String>, AppError> {
        Ok(self.load_map().await?.into_keys().collect())
    }

    /// Load a single review.
    pub async fn get(&self, id: &str) -> Result<CodeReview, AppError> {
        self.load_map()
            .await?
            .remove(id)
            .ok_or_else(|| AppError::not_found_with_id("CodeReview", id))
    }

    /// Mutate one existing review under the lock and persist it.
    ///
    /// If `f` fails nothing is written.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<CodeReview, AppError>
    where
        F: FnOnce(&mut CodeReview) -> Result<(), AppError>,
    {
        let _guard = self.lock.lock().await;

        let mut map = self.load_map().await?;
        let review = map
            .get_mut(id)
            .ok_or_else(|| AppError::not_found_with_id("CodeReview", id))?;
        f(review)?;
        let updated = review.clone();

        self.save_map(&map).await?;
        Ok(updated)
    }

    /// Store `review` unless a record with the same id already exists.
    ///
    /// Returns whether it was inserted. An existing record is never touched.
    pub async fn insert_if_absent(&self, review: CodeReview) -> Result<bool, AppError> {
        let _guard = self.lock.lock().await;

        let mut map = self.load_map().await?;
        if map.contains_key(&review.id) {
            return Ok(false);
        }
        log::debug!("[store] Inserting {}", review.id);
        map.insert(review.id.clone(), review);

        self.save_map(&map).await?;
        Ok(true)
    }

    /// Login of the board's owner, if configured.
    pub async fn github_user(&self) -> Result<Option<String>, AppError> {
        self.kv
            .get::<String>(GITHUB_USER_KEY)
            .await
            .map(|user| user.filter(|u| !u.is_empty()))
            .map_err(|e| storage_error(e, "load github_user"))
    }

    pub async fn set_github_user(&self, user: &str) -> Result<(), AppError> {
        self.kv
            .set(GITHUB_USER_KEY, user)
            .await
            .map_err(|e| storage_error(e, "save github_user"))
    }

    /// Configured mention triggers, defaulting to `@<user>` when none are stored.
    pub async fn mention_triggers(&self) -> Result<Vec<String>, AppError> {
        let stored = self
            .kv
            .get::<Vec<String>>(MENTION_TRIGGERS_KEY)
            .await
            .map_err(|e| storage_error(e, "load mention_triggers"))?;

        match stored {
            Some(triggers) => Ok(triggers),
            None => Ok(self
                .github_user()
                .await?
                .map(|user| vec![format!("@{}", user)])
                .unwrap_or_default()),
        }
    }

    pub async fn set_mention_triggers(&self, triggers: &[String]) -> Result<(), AppError> {
        self.kv
            .set(MENTION_TRIGGERS_KEY, triggers)
            .await
            .map_err(|e| storage_error(e, "save mention_triggers"))
    }

    pub async fn last_visited_review(&self) -> Result<Option<String>, AppError> {
        self.kv
            .get::<String>(LAST_VISITED_REVIEW_KEY)
            .await
            .map_err(|e| storage_error(e, "load last_visited_review"))
    }

    pub async fn set_last_visited_review(&self, id: &str) -> Result<(), AppError> {
        self.kv
            .set(LAST_VISITED_REVIEW_KEY, id)
            .await
            .map_err(|e| storage_error(e, "save last_visited_review"))
    }
}
