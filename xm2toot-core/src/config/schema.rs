//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration for xm2toot
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// XMPP account and room
    #[serde(default)]
    pub xmpp: XmppConfig,
    /// Mastodon instance and account
    #[serde(default)]
    pub mastodon: MastodonConfig,
    /// Bridge timing
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// XMPP account and multi-user chat settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct XmppConfig {
    /// Bot account JID, e.g. `bot@example.org`
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Room JID, e.g. `meetup@conference.example.org`
    #[serde(default)]
    pub muc: String,
    /// Nickname used in the room
    #[serde(default)]
    pub muc_nick: String,
    /// Bare JIDs allowed to stop the bot via direct message
    #[serde(default)]
    pub admins: Vec<String>,
}

/// Mastodon API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonConfig {
    /// Instance host (`mastodon.social`) or base URL (`https://mastodon.social`)
    #[serde(default)]
    pub instance: String,
    /// Access token sent as bearer authorization
    #[serde(default)]
    pub token: String,
    /// Account name used in notification summaries
    #[serde(default)]
    pub account: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    "xm2toot".to_string()
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            instance: String::new(),
            token: String::new(),
            account: String::new(),
            user_agent: default_user_agent(),
        }
    }
}

impl MastodonConfig {
    /// Base URL of the instance, defaulting to https for bare hosts
    pub fn base_url(&self) -> String {
        let instance = self.instance.trim().trim_end_matches('/');
        if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.to_string()
        } else {
            format!("https://{}", instance)
        }
    }
}

/// Bridge timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Delay before reconnecting a failed notification stream
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Connect timeout of the streaming connection; reads never time out
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Total timeout of REST lookups
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long the supervisor waits for tasks to stop before aborting them
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
