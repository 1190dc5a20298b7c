//! Shared types for the Mastodon integration

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for Mastodon operations
#[derive(Error, Debug)]
pub enum MastodonError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unexpected response status: {0}")]
    UnexpectedStatus(reqwest::StatusCode),

    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    #[error("Queue error: {0}")]
    Queue(#[from] xm2toot_core::Error),
}

pub type MastodonResult<T> = Result<T, MastodonError>;

/// Account fields returned by `verify_credentials`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStats {
    pub display_name: String,
    pub username: String,
    pub followers_count: u64,
    pub statuses_count: u64,
    pub url: String,
}

/// Lookup of the bot's own account
#[async_trait]
pub trait AccountLookup: Send + Sync {
    /// Fetch the authenticated account
    async fn verify_credentials(&self) -> MastodonResult<AccountStats>;
}
