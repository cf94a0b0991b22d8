//! Application error types.
//!
//! These errors are serializable so the RPC layer can hand a structured
//! failure back to the web UI instead of a bare status code.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned by the store, orchestrator and commands.
///
/// All variants serialize to a structured JSON object for frontend consumption.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Store read or write failed.
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// The remote fetch succeeded but writing its result failed.
    ///
    /// The cached record is stale and should be re-fetched next time.
    #[error("Failed to persist fetched data for {id}: {message}")]
    PersistAfterFetch { message: String, id: String },

    /// GitHub API request failed (rate limit, auth, bad response).
    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a storage error with operation context.
    pub fn storage_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a persist-after-fetch error for a review.
    pub fn persist_after_fetch(message: impl Into<String>, id: impl Into<String>) -> Self {
        Self::PersistAfterFetch {
            message: message.into(),
            id: id.into(),
        }
    }

    /// Create a GitHub API error.
    pub fn github_api(message: impl Into<String>) -> Self {
        Self::GitHubApi {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create a GitHub API error with status code and endpoint.
    pub fn github_api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::GitHubApi {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the failure came from the remote platform rather than from us.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::GitHubApi { .. } | Self::Network { .. })
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::github_api(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::storage(err.to_string())
    }
}
