//! Transport trait and chat events

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Join failed: {0}")]
    JoinFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Channel closed: {0}")]
    Closed(String),

    #[error("Queue error: {0}")]
    Queue(#[from] xm2toot_core::Error),
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Groupchat message from a room occupant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    /// Occupant nickname
    pub nick: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl RoomMessage {
    pub fn new(nick: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            body: body.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One-to-one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessage {
    /// Full sender JID
    pub from: String,
    pub body: String,
}

/// Event delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Our own presence came back from the room with the nick we hold
    Joined { nick: String },
    JoinFailed(String),
    Room(RoomMessage),
    Direct(DirectMessage),
    Disconnected(String),
}

/// Connection to a chat service able to hold one room session
#[async_trait]
pub trait ChatTransport: Send {
    /// Request to join `room` as `nick`, without history
    ///
    /// Completion is reported later as [`ChatEvent::Joined`].
    async fn join_room(&mut self, room: &str, nick: &str) -> Result<()>;

    /// Send a groupchat message to the joined room
    async fn send_room(&mut self, body: &str) -> Result<()>;

    /// Send a one-to-one message
    async fn send_direct(&mut self, to: &str, body: &str) -> Result<()>;

    /// Leave the joined room
    async fn leave_room(&mut self) -> Result<()>;

    /// Close the underlying stream
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Next event, or `None` once the transport has shut down
    ///
    /// Must be cancel safe: dropping the future loses no returned event.
    async fn next_event(&mut self) -> Result<Option<ChatEvent>>;
}
