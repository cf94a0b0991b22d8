//! Business logic services.
//!
//! `reconcile` is the pure merge of remote truth into workflow state;
//! `review_store` owns the persisted map and its lock; `sync_engine` drives
//! discovery and refresh against a `RemoteSource` such as `github_client`.
//! `api` and `server` expose all of it over HTTP.

pub mod api;
pub mod github_client;
pub mod reconcile;
pub mod remote;
pub mod review_store;
pub mod server;
pub mod sync_engine;

pub use github_client::GitHubClient;
pub use review_store::ReviewStore;
pub use sync_engine::SyncEngine;
