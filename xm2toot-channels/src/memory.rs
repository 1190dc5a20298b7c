//! In-process transport
//!
//! Records everything the bridge sends and lets the holder of the
//! [`MemoryHandle`] inject chat events.

use crate::base::{ChannelError, ChatEvent, ChatTransport, DirectMessage, Result, RoomMessage};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Something the bridge sent through the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Join { room: String, nick: String },
    Room(String),
    Direct { to: String, body: String },
    Leave,
    Closed,
}

pub struct MemoryTransport {
    events_tx: mpsc::UnboundedSender<ChatEvent>,
    events_rx: mpsc::UnboundedReceiver<ChatEvent>,
    outgoing_tx: mpsc::UnboundedSender<Outgoing>,
    /// Answer joins with an immediate `Joined` event
    auto_join: bool,
    joined: bool,
}

/// Test side of a [`MemoryTransport`]
pub struct MemoryHandle {
    events_tx: mpsc::UnboundedSender<ChatEvent>,
    outgoing_rx: mpsc::UnboundedReceiver<Outgoing>,
}

/// Create a connected transport and handle
pub fn memory_transport() -> (MemoryTransport, MemoryHandle) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

    let transport = MemoryTransport {
        events_tx: events_tx.clone(),
        events_rx,
        outgoing_tx,
        auto_join: true,
        joined: false,
    };
    let handle = MemoryHandle {
        events_tx,
        outgoing_rx,
    };
    (transport, handle)
}

impl MemoryTransport {
    /// Leave join completion to the handle
    pub fn manual_join(mut self) -> Self {
        self.auto_join = false;
        self
    }

    fn record(&self, item: Outgoing) -> Result<()> {
        self.outgoing_tx
            .send(item)
            .map_err(|_| ChannelError::SendFailed("memory handle dropped".to_string()))
    }
}

#[async_trait]
impl ChatTransport for MemoryTransport {
    async fn join_room(&mut self, room: &str, nick: &str) -> Result<()> {
        self.record(Outgoing::Join {
            room: room.to_string(),
            nick: nick.to_string(),
        })?;
        if self.auto_join {
            let _ = self.events_tx.send(ChatEvent::Joined {
                nick: nick.to_string(),
            });
        }
        self.joined = true;
        Ok(())
    }

    async fn send_room(&mut self, body: &str) -> Result<()> {
        if !self.joined {
            return Err(ChannelError::SendFailed("not in a room".to_string()));
        }
        self.record(Outgoing::Room(body.to_string()))
    }

    async fn send_direct(&mut self, to: &str, body: &str) -> Result<()> {
        self.record(Outgoing::Direct {
            to: to.to_string(),
            body: body.to_string(),
        })
    }

    async fn leave_room(&mut self) -> Result<()> {
        self.joined = false;
        self.record(Outgoing::Leave)
    }

    async fn close(&mut self) -> Result<()> {
        self.record(Outgoing::Closed)
    }

    async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        Ok(self.events_rx.recv().await)
    }
}

impl MemoryHandle {
    pub fn inject(&self, event: ChatEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Inject a groupchat message from `nick`
    pub fn room_message(&self, nick: &str, body: &str) {
        self.inject(ChatEvent::Room(RoomMessage::new(nick, body)));
    }

    /// Inject a one-to-one message from the full JID `from`
    pub fn direct_message(&self, from: &str, body: &str) {
        self.inject(ChatEvent::Direct(DirectMessage {
            from: from.to_string(),
            body: body.to_string(),
        }));
    }

    /// Wait for the next thing the bridge sends
    pub async fn next_outgoing(&mut self) -> Option<Outgoing> {
        self.outgoing_rx.recv().await
    }

    /// Everything sent so far that has not been received yet
    pub fn drain(&mut self) -> Vec<Outgoing> {
        let mut items = Vec::new();
        while let Ok(item) = self.outgoing_rx.try_recv() {
            items.push(item);
        }
        items
    }
}
