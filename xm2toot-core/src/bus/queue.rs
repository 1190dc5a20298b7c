//! Async message queue implementation

use super::events::{Command, OutboundMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

/// Type alias for the command queue receiver
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;
/// Type alias for the outbound relay queue receiver
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundMessage>;

/// Async message bus that decouples the room from the stream and command tasks
///
/// The chat session pushes commands to the command queue; the command
/// processor and the stream reader push messages to the outbound queue,
/// which the chat session drains into the room. Both queues are unbounded
/// FIFOs with exactly one consumer.
#[derive(Clone)]
pub struct MessageBus {
    /// Commands extracted from room messages
    command_tx: mpsc::UnboundedSender<Command>,
    command_rx: Arc<RwLock<Option<CommandReceiver>>>,
    /// Messages destined for the room
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: Arc<RwLock<Option<OutboundReceiver>>>,
}

impl MessageBus {
    /// Create a new message bus
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            command_tx,
            command_rx: Arc::new(RwLock::new(Some(command_rx))),
            outbound_tx,
            outbound_rx: Arc::new(RwLock::new(Some(outbound_rx))),
        }
    }

    /// Take the command receiver (can only be called once)
    pub async fn take_command_receiver(&self) -> Option<CommandReceiver> {
        self.command_rx.write().await.take()
    }

    /// Take the outbound receiver (can only be called once)
    pub async fn take_outbound_receiver(&self) -> Option<OutboundReceiver> {
        self.outbound_rx.write().await.take()
    }

    /// Publish a command from the room to the command processor
    pub fn publish_command(&self, command: Command) -> crate::Result<()> {
        debug!("Queueing command {:?} from {}", command.text, command.sender);
        self.command_tx
            .send(command)
            .map_err(|_| crate::Error::Channel("Command queue closed".to_string()))
    }

    /// Publish a message destined for the room
    pub fn publish_outbound(&self, msg: OutboundMessage) -> crate::Result<()> {
        self.outbound_tx
            .send(msg)
            .map_err(|_| crate::Error::Channel("Outbound queue closed".to_string()))
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
