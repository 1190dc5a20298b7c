//! Message bus for decoupled communication
//!
//! The bus provides the two queues of the bridge: commands extracted from
//! the chat room, and outbound messages destined for the room.

pub mod events;
pub mod queue;

pub use events::{Command, MessageSource, OutboundMessage};
pub use queue::{CommandReceiver, MessageBus, OutboundReceiver};
