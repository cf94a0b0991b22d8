//! Workboard - tracks the review lifecycle of GitHub pull requests.
//!
//! Platform state (open/closed/merged, mentions, archival) is reconciled with
//! the user's own workflow state (snoozed, must-review, reviewed, deleted) and
//! kept in a local SQLite database. The binary exposes it as a JSON API.

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use config::{Command, Config};
use db::kv::SqliteKvStore;
use error::AppError;
use services::api::ApiState;
use services::github_client::GitHubClient;
use services::review_store::ReviewStore;
use services::sync_engine::SyncEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Open the database and wire the store, GitHub client and sync engine.
pub async fn open(config: &Config) -> Result<SyncEngine, AppError> {
    let pool = db::initialize(&config.database).await?;
    log::info!("[app] Database ready at {}", config.database.display());

    let store = Arc::new(ReviewStore::new(Arc::new(SqliteKvStore::new(pool))));
    if let Some(user) = &config.github_user {
        commands::settings::update_settings(
            &store,
            commands::settings::SettingsUpdate {
                github_user: Some(user.clone()),
                mention_triggers: None,
            },
        )
        .await?;
    }

    let client = GitHubClient::new(config.client_config())?;
    Ok(SyncEngine::new(store, Arc::new(client), config.sync_config()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the subcommand selected in `config`.
///
/// `serve` runs until `shutdown` is cancelled.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<(), AppError> {
    let engine = open(&config).await?;

    match &config.command {
        Command::Serve { listen, .. } => {
            let sync_handle = engine.start_background();
            let state = ApiState {
                engine,
                sync_handle: Some(sync_handle.clone()),
            };

            let result = services::server::serve(listen, state, shutdown).await;
            if let Err(e) = sync_handle.stop().await {
                log::warn!("[app] Could not stop sync engine: {}", e);
            }
            result
        }
        Command::Discover => print_json(&engine.discover().await?),
        Command::Refresh { ids, all } => {
            let report = if *all {
                engine.refresh_all().await?
            } else {
                engine.refresh(ids).await?
            };
            print_json(&report)
        }
        Command::List { include_deleted } => {
            let mut reviews = engine.store().list().await?;
            if !include_deleted {
                reviews.retain(|r| !r.is_deleted());
            }
            print_json(&reviews)
        }
    }
}
