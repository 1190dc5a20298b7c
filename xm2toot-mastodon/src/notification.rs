//! Notification payloads from the user stream
//!
//! The user stream is server-sent events: `event: <name>` and
//! `data: <json>` lines, plus `:thump` keepalive comments. Notification
//! payloads are JSON objects with a `type` field; status updates and
//! deletes have none and are not relayed.

use crate::base::{MastodonError, MastodonResult};
use crate::html::strip_html;
use serde::Deserialize;
use serde_json::Value;

/// Reference used for mentions that must not leak their content
pub const PRIVATE_REFERENCE: &str = "a private message";

/// Account that triggered a notification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub url: String,
}

/// Status visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
    #[serde(other)]
    Unknown,
}

impl Visibility {
    /// Whether the status may be quoted into the room
    pub fn is_quotable(self) -> bool {
        matches!(self, Visibility::Public | Visibility::Unlisted)
    }
}

/// Status referenced by a mention
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MentionedStatus {
    pub visibility: Visibility,
    #[serde(default)]
    pub url: Option<String>,
    /// Status content as HTML
    #[serde(default)]
    pub content: String,
}

/// One notification from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    Follow { actor: Actor },
    Reblog { actor: Actor, status_url: String },
    Favourite { actor: Actor, status_url: String },
    Mention { actor: Actor, status: Option<MentionedStatus> },
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct RawNotification {
    account: Actor,
    #[serde(default)]
    status: Option<RawStatus>,
}

#[derive(Deserialize)]
struct RawStatus {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    visibility: Visibility,
    #[serde(default)]
    content: String,
}

impl RawStatus {
    /// Web URL, falling back to the ActivityPub URI
    fn link(&self) -> Option<String> {
        self.url.clone().or_else(|| self.uri.clone())
    }
}

impl NotificationEvent {
    /// Decode a notification payload
    ///
    /// Returns `Ok(None)` for payloads that are not notifications.
    pub fn from_value(value: Value) -> MastodonResult<Option<Self>> {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Ok(None);
        };
        let kind = kind.to_string();

        let event = match kind.as_str() {
            "follow" => NotificationEvent::Follow {
                actor: decode(value)?.account,
            },
            "reblog" | "favourite" => {
                let raw = decode(value)?;
                let status_url = raw
                    .status
                    .as_ref()
                    .and_then(RawStatus::link)
                    .ok_or_else(|| {
                        MastodonError::MalformedNotification(format!("{} without status", kind))
                    })?;
                if kind == "reblog" {
                    NotificationEvent::Reblog {
                        actor: raw.account,
                        status_url,
                    }
                } else {
                    NotificationEvent::Favourite {
                        actor: raw.account,
                        status_url,
                    }
                }
            }
            "mention" => {
                let raw = decode(value)?;
                NotificationEvent::Mention {
                    actor: raw.account,
                    status: raw.status.map(|s| MentionedStatus {
                        url: s.link(),
                        visibility: s.visibility,
                        content: s.content,
                    }),
                }
            }
            _ => NotificationEvent::Unknown { kind },
        };
        Ok(Some(event))
    }
}

fn decode(value: Value) -> MastodonResult<RawNotification> {
    serde_json::from_value(value).map_err(|e| MastodonError::MalformedNotification(e.to_string()))
}

/// Parse the data field of one stream event
///
/// Empty data and data that is not a JSON object (delete ids, for
/// instance) yield `Ok(None)`. Undecodable JSON is an error.
pub fn parse_data(data: &str) -> MastodonResult<Option<NotificationEvent>> {
    let data = data.trim();
    if !data.starts_with('{') {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(data)?;
    NotificationEvent::from_value(value)
}

/// Room text for a notification, or `None` for unknown types
pub fn format_notification(event: &NotificationEvent, self_account: &str) -> Option<String> {
    let text = match event {
        NotificationEvent::Follow { actor } => format!(
            "{} ({}) started following {}",
            actor.display_name, actor.url, self_account
        ),
        NotificationEvent::Reblog { actor, status_url } => format!(
            "{} ({}) has boosted {}",
            actor.display_name, actor.url, status_url
        ),
        NotificationEvent::Favourite { actor, status_url } => format!(
            "{} ({}) has favorited {}",
            actor.display_name, actor.url, status_url
        ),
        NotificationEvent::Mention {
            status: None,
            ..
        } => format!("{} was mentioned, check notifications", self_account),
        NotificationEvent::Mention {
            actor,
            status: Some(status),
        } => {
            let reference = if status.visibility.is_quotable() {
                format!(
                    "{} \"{}\"",
                    status.url.as_deref().unwrap_or_default(),
                    strip_html(&status.content)
                )
            } else {
                PRIVATE_REFERENCE.to_string()
            };
            format!(
                "{} ({}) has mentioned {} in {}",
                actor.display_name, actor.url, self_account, reference
            )
        }
        NotificationEvent::Unknown { .. } => return None,
    };
    Some(text)
}
