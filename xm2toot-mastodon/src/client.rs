//! Mastodon HTTP client

use crate::base::{AccountLookup, AccountStats, MastodonError, MastodonResult};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;
use xm2toot_core::config::{BridgeConfig, MastodonConfig};

const VERIFY_CREDENTIALS: &str = "/api/v1/accounts/verify_credentials";
const USER_STREAM: &str = "/api/v1/streaming/user";

/// Bearer-token client for one instance
///
/// Holds two connection pools: REST lookups run with a total timeout,
/// while the streaming pool only bounds the connect phase so a quiet
/// stream is never cut off.
#[derive(Clone)]
pub struct MastodonClient {
    base_url: String,
    token: String,
    user_agent: String,
    rest: Client,
    streaming: Client,
}

impl MastodonClient {
    pub fn new(config: &MastodonConfig, bridge: &BridgeConfig) -> MastodonResult<Self> {
        Self::with_base_url(config.base_url(), config, bridge)
    }

    /// Build a client against an explicit base URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        config: &MastodonConfig,
        bridge: &BridgeConfig,
    ) -> MastodonResult<Self> {
        let rest = Client::builder()
            .timeout(bridge.request_timeout())
            .build()?;
        let streaming = Client::builder()
            .connect_timeout(bridge.connect_timeout())
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
            rest,
            streaming,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, &self.user_agent)
    }

    /// Fetch the authenticated account
    pub async fn verify_credentials(&self) -> MastodonResult<AccountStats> {
        let url = self.api_url(VERIFY_CREDENTIALS);
        debug!("GET {}", url);

        let response = self.authorize(self.rest.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MastodonError::UnexpectedStatus(status));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Open the user notification stream
    ///
    /// The response is returned for any status; callers decide whether
    /// a non-200 answer ends the attempt.
    pub async fn open_user_stream(&self) -> MastodonResult<Response> {
        let url = self.api_url(USER_STREAM);
        debug!("GET {}", url);

        let response = self.authorize(self.streaming.get(&url)).send().await?;
        Ok(response)
    }
}

/// Whether a streaming response may be read
pub fn is_stream_open(status: StatusCode) -> bool {
    status == StatusCode::OK
}

#[async_trait]
impl AccountLookup for MastodonClient {
    async fn verify_credentials(&self) -> MastodonResult<AccountStats> {
        MastodonClient::verify_credentials(self).await
    }
}
