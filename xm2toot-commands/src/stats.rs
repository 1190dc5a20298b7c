//! `stats` directive: follower and status counts of the bot account

use crate::directive::{Directive, DirectiveError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use xm2toot_mastodon::{AccountLookup, AccountStats};

pub struct StatsDirective {
    api: Arc<dyn AccountLookup>,
}

impl StatsDirective {
    pub fn new(api: Arc<dyn AccountLookup>) -> Self {
        Self { api }
    }
}

pub fn format_stats(account: &AccountStats) -> String {
    format!(
        "{} (@{}) has {} followers and {} Toots. URL: {}",
        account.display_name,
        account.username,
        account.followers_count,
        account.statuses_count,
        account.url
    )
}

#[async_trait]
impl Directive for StatsDirective {
    fn name(&self) -> &str {
        "stats"
    }

    async fn execute(&self) -> Result<String> {
        let account = self
            .api
            .verify_credentials()
            .await
            .map_err(|e| DirectiveError::LookupFailed(e.to_string()))?;
        Ok(format_stats(&account))
    }
}
