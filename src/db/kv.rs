//! Key/value persistence of opaque JSON values.
//!
//! The whole review map lives under one key, next to a few scalar
//! configuration values. A missing key is not an error.

use super::pool::DbPool;
use super::DbError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Get/set/delete of JSON text addressed by string key.
///
/// Implementations offer per-key atomicity only. Anything that needs
/// read-then-write consistency across calls must serialize itself.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Return the raw JSON stored under `key`, or `None` if absent.
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DbError>;

    /// Store raw JSON under `key`, replacing any previous value.
    async fn set_raw(&self, key: &str, value: String) -> Result<(), DbError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), DbError>;
}

impl dyn KeyValueStore {
    /// Deserialize the value under `key`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, DbError> {
        match self.get_raw(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| DbError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), DbError> {
        let raw = serde_json::to_string(value).map_err(|source| DbError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.set_raw(key, raw).await
    }
}

/// `KeyValueStore` backed by the `kv_store` SQLite table.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: DbPool,
}

impl SqliteKvStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DbError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, strftime('%s', 'now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn open_store() -> (tempfile::TempDir, Arc<dyn KeyValueStore>) {
        let dir = tempdir().unwrap();
        let pool = crate::db::initialize(&dir.path().join("kv.db")).await.unwrap();
        (dir, Arc::new(SqliteKvStore::new(pool)))
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let (_dir, store) = open_store().await;
        let value: Option<String> = store.get("github_user").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites_and_delete_removes() {
        let (_dir, store) = open_store().await;

        store.set("github_user", "octocat").await.unwrap();
        store.set("github_user", "hubot").await.unwrap();
        let value: Option<String> = store.get("github_user").await.unwrap();
        assert_eq!(value.as_deref(), Some("hubot"));

        store.delete("github_user").await.unwrap();
        store.delete("github_user").await.unwrap();
        let value: Option<String> = store.get("github_user").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_structured_values() {
        let (_dir, store) = open_store().await;

        let mut map = BTreeMap::new();
        map.insert("a".to_string(), vec![1, 2, 3]);
        store.set("numbers", &map).await.unwrap();

        let loaded: BTreeMap<String, Vec<i32>> = store.get("numbers").await.unwrap().unwrap();
        assert_eq!(loaded, map);
    }

    #[tokio::test]
    async fn test_type_mismatch_reports_key() {
        let (_dir, store) = open_store().await;
        store.set("mention_triggers", "not-a-list").await.unwrap();

        let err = store.get::<Vec<String>>("mention_triggers").await.unwrap_err();
        assert!(err.to_string().contains("mention_triggers"));
    }
}
