//! Settings stored next to the reviews: remote user and mention triggers.

use crate::error::AppError;
use crate::services::review_store::ReviewStore;
use serde::{Deserialize, Serialize};

/// Current settings as shown to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub github_user: Option<String>,
    /// Effective triggers, including the `@user` default.
    pub mention_triggers: Vec<String>,
    pub last_visited_review: Option<String>,
}

/// Partial update; absent fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub github_user: Option<String>,
    pub mention_triggers: Option<Vec<String>>,
}

pub async fn get_settings(store: &ReviewStore) -> Result<Settings, AppError> {
    Ok(Settings {
        github_user: store.github_user().await?,
        mention_triggers: store.mention_triggers().await?,
        last_visited_review: store.last_visited_review().await?,
    })
}

/// The login ends up quoted inside search queries.
fn validate_github_user(user: &str) -> Result<(), AppError> {
    if user.is_empty() || user.len() > 39 {
        return Err(AppError::invalid_input_field(
            "GitHub user must be 1 to 39 characters",
            "githubUser",
        ));
    }
    if !user.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(AppError::invalid_input_field(
            "GitHub user may only contain letters, digits and '-'",
            "githubUser",
        ));
    }
    Ok(())
}

pub async fn update_settings(
    store: &ReviewStore,
    update: SettingsUpdate,
) -> Result<Settings, AppError> {
    if let Some(user) = &update.github_user {
        validate_github_user(user)?;
    }
    if let Some(triggers) = &update.mention_triggers {
        if triggers.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::invalid_input_field(
                "Mention triggers must not be empty",
                "mentionTriggers",
            ));
        }
    }

    if let Some(user) = &update.github_user {
        log::info!("[settings] GitHub user set to {}", user);
        store.set_github_user(user).await?;
    }
    if let Some(triggers) = &update.mention_triggers {
        log::info!("[settings] Mention triggers set to {:?}", triggers);
        store.set_mention_triggers(triggers).await?;
    }

    get_settings(store).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv::SqliteKvStore;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn setup() -> (tempfile::TempDir, ReviewStore) {
        let dir = tempdir().unwrap();
        let pool = crate::db::initialize(&dir.path().join("settings.db")).await.unwrap();
        (dir, ReviewStore::new(Arc::new(SqliteKvStore::new(pool))))
    }

    #[tokio::test]
    async fn test_default_settings() {
        let (_dir, store) = setup().await;
        assert_eq!(get_settings(&store).await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_update_settings() {
        let (_dir, store) = setup().await;

        let settings = update_settings(
            &store,
            SettingsUpdate {
                github_user: Some("octo-cat".to_string()),
                mention_triggers: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(settings.github_user.as_deref(), Some("octo-cat"));
        assert_eq!(settings.mention_triggers, vec!["@octo-cat"]);

        let settings = update_settings(
            &store,
            SettingsUpdate {
                github_user: None,
                mention_triggers: Some(vec!["@octo-cat".to_string(), "@org/reviewers".to_string()]),
            },
        )
        .await
        .unwrap();
        assert_eq!(settings.github_user.as_deref(), Some("octo-cat"));
        assert_eq!(settings.mention_triggers.len(), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_bad_input_without_writing() {
        let (_dir, store) = setup().await;

        let err = update_settings(
            &store,
            SettingsUpdate {
                github_user: Some("octocat".to_string()),
                mention_triggers: Some(vec!["".to_string()]),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
        assert!(store.github_user().await.unwrap().is_none());

        let err = update_settings(
            &store,
            SettingsUpdate {
                github_user: Some("bad\" user".to_string()),
                mention_triggers: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput { .. }));
    }
}
