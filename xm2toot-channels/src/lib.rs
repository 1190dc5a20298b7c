//! Chat room integration for xm2toot
//!
//! The bridge drives one multi-user chat session: room commands go to the
//! command processor, and outbound messages are sent back to the room.
//! Transports implement [`ChatTransport`]; [`XmppTransport`] connects to a
//! real server and [`memory::MemoryTransport`] stands in for one in tests.

pub mod base;
pub mod bridge;
pub mod memory;
pub mod xmpp;

pub use base::{ChannelError, ChatEvent, ChatTransport, DirectMessage, Result, RoomMessage};
pub use bridge::{extract_command, BridgeSettings, ChatSessionBridge};
pub use xmpp::XmppTransport;
