//! Command line and environment configuration.

use crate::services::github_client::{GitHubClientConfig, DEFAULT_API_BASE_URL};
use crate::services::remote::PaginationPolicy;
use crate::services::sync_engine::{SyncConfig, DEFAULT_REMOTE_TIMEOUT_SECS, DEFAULT_SYNC_INTERVAL_SECS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tracks the review lifecycle of GitHub pull requests
#[derive(Parser, Debug)]
#[command(name = "workboard")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// SQLite database file
    #[arg(long, env = "WORKBOARD_DATABASE", default_value = "workboard.db", global = true)]
    pub database: PathBuf,

    /// GitHub REST API root
    #[arg(long, env = "WORKBOARD_GITHUB_API_URL", default_value = DEFAULT_API_BASE_URL, global = true)]
    pub github_api_url: String,

    /// GitHub personal access token (anonymous access if empty)
    #[arg(
        long,
        env = "WORKBOARD_GITHUB_TOKEN",
        default_value = "",
        hide_env_values = true,
        hide_default_value = true,
        global = true
    )]
    pub github_token: String,

    /// GitHub login whose PRs are tracked; stored on startup if given
    #[arg(long, env = "WORKBOARD_GITHUB_USER", global = true)]
    pub github_user: Option<String>,

    /// Timeout for a single GitHub request, in seconds
    #[arg(long, env = "WORKBOARD_REQUEST_TIMEOUT", default_value_t = DEFAULT_REMOTE_TIMEOUT_SECS, global = true)]
    pub request_timeout_secs: u64,

    /// Keep the results of a search that failed halfway instead of dropping them
    #[arg(long, global = true)]
    pub keep_partial_searches: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API and sync in the background
    Serve {
        /// Address to listen on
        #[arg(long, env = "WORKBOARD_LISTEN", default_value = "127.0.0.1:8080")]
        listen: String,

        /// Background sync interval in seconds, 0 disables it
        #[arg(long, env = "WORKBOARD_SYNC_INTERVAL", default_value_t = DEFAULT_SYNC_INTERVAL_SECS)]
        sync_interval_secs: u64,
    },

    /// Search GitHub once and add new pull requests
    Discover,

    /// Refresh tracked pull requests from GitHub
    Refresh {
        /// Code review ids (PR URLs)
        #[arg(required_unless_present = "all")]
        ids: Vec<String>,

        /// Refresh every tracked review
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Print tracked code reviews as JSON
    List {
        /// Include deleted reviews
        #[arg(long)]
        include_deleted: bool,
    },
}

impl Config {
    pub fn client_config(&self) -> GitHubClientConfig {
        GitHubClientConfig {
            api_base_url: self.github_api_url.clone(),
            token: self.github_token.clone(),
            timeout_secs: self.request_timeout_secs,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        let interval_secs = match &self.command {
            Command::Serve {
                sync_interval_secs, ..
            } => *sync_interval_secs,
            _ => 0,
        };

        SyncConfig {
            interval_secs,
            pagination_policy: if self.keep_partial_searches {
                PaginationPolicy::KeepPartial
            } else {
                PaginationPolicy::AbortQuery
            },
            remote_timeout_secs: self.request_timeout_secs,
            ..SyncConfig::default()
        }
    }
}
