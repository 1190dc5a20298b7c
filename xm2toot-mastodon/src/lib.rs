//! Mastodon integration for xm2toot
//!
//! Provides the REST client used by room commands, the user notification
//! stream reader, and the parser that turns stream events into room text.

pub mod base;
pub mod client;
pub mod html;
pub mod notification;
pub mod stream;

pub use base::{AccountLookup, AccountStats, MastodonError, MastodonResult};
pub use client::MastodonClient;
pub use notification::{format_notification, parse_data, NotificationEvent};
pub use stream::{StreamReader, StreamState};
