//! Event types for the message bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Command addressed to the bot in the chat room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Directive text with the nickname prefix removed
    pub text: String,
    /// Nickname of the room member who sent it
    pub sender: String,
    /// Time the command was extracted
    pub received_at: DateTime<Utc>,
}

impl Command {
    /// Create a new command
    pub fn new(text: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: sender.into(),
            received_at: Utc::now(),
        }
    }
}

/// Producer of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    /// Summary of a streaming notification
    Notification,
    /// Reply to a room command
    CommandReply,
}

/// Plain text message to send to the chat room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Message text content; empty for a command that produced no reply
    pub content: String,
    /// Which task produced the message
    pub source: MessageSource,
}

impl OutboundMessage {
    /// Create a notification summary
    pub fn notification(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: MessageSource::Notification,
        }
    }

    /// Create a command reply
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: MessageSource::CommandReply,
        }
    }

    /// Placeholder for a processed command without a reply
    pub fn no_reply() -> Self {
        Self::reply(String::new())
    }

    /// Whether there is anything to send
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}
