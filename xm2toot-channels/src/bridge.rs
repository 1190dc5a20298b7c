//! Chat session bridge between the room and the message bus

use crate::base::{ChannelError, ChatEvent, ChatTransport, DirectMessage, Result, RoomMessage};
use std::str::FromStr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_xmpp::parsers::jid::{BareJid, Jid};
use tracing::{debug, error, info, warn};
use xm2toot_commands::CommandProcessor;
use xm2toot_core::bus::{Command, MessageBus};
use xm2toot_core::config::XmppConfig;
use xm2toot_core::StopSignal;

/// Body of the admin direct message that stops the bot
pub const QUIT_COMMAND: &str = "quit";

/// Extract a command addressed to `nick`
///
/// The body must start with the nickname; one `,` or `:` after it is
/// dropped and the rest trimmed. Empty remainders yield `None`.
pub fn extract_command(body: &str, nick: &str) -> Option<String> {
    if nick.is_empty() {
        return None;
    }
    let rest = body.strip_prefix(nick)?;
    let rest = rest
        .strip_prefix(',')
        .or_else(|| rest.strip_prefix(':'))
        .unwrap_or(rest);
    let command = rest.trim();
    if command.is_empty() {
        None
    } else {
        Some(command.to_string())
    }
}

/// Room and access settings of a session
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub room: String,
    pub nick: String,
    /// Bare JIDs allowed to send `quit`
    pub admins: Vec<String>,
}

impl BridgeSettings {
    pub fn from_config(config: &XmppConfig) -> Self {
        Self {
            room: config.muc.clone(),
            nick: config.muc_nick.clone(),
            admins: config.admins.clone(),
        }
    }

    /// Whether the bare JID of `from` is an admin
    ///
    /// JIDs are compared in their normalized form, so case in the node
    /// and domain does not matter. Unparsable JIDs never match.
    pub fn is_admin(&self, from: &str) -> bool {
        let Ok(from) = Jid::from_str(from) else {
            return false;
        };
        let bare = from.to_bare();
        self.admins
            .iter()
            .filter_map(|admin| BareJid::from_str(admin).ok())
            .any(|admin| admin == bare)
    }
}

/// Runs one room session over a transport
///
/// Ingress turns addressed room messages into commands; egress sends
/// every outbound message to the room once the join has completed.
pub struct ChatSessionBridge<T: ChatTransport> {
    transport: T,
    settings: BridgeSettings,
    bus: MessageBus,
    processor: Option<CommandProcessor>,
    stop: StopSignal,
    /// Nick confirmed by the room, or the configured one before joining
    own_nick: String,
    joined: bool,
}

impl<T: ChatTransport> ChatSessionBridge<T> {
    pub fn new(
        transport: T,
        settings: BridgeSettings,
        bus: MessageBus,
        processor: CommandProcessor,
        stop: StopSignal,
    ) -> Self {
        let own_nick = settings.nick.clone();
        Self {
            transport,
            settings,
            bus,
            processor: Some(processor),
            stop,
            own_nick,
            joined: false,
        }
    }

    /// Run until cancelled or the session fails
    ///
    /// On cancellation the room is left and the transport closed before
    /// returning. The command processor runs as a child task and is
    /// stopped with the bridge.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let mut outbound = self
            .bus
            .take_outbound_receiver()
            .await
            .ok_or_else(|| ChannelError::Closed("outbound queue already taken".to_string()))?;
        let commands = self
            .bus
            .take_command_receiver()
            .await
            .ok_or_else(|| ChannelError::Closed("command queue already taken".to_string()))?;
        let processor = self
            .processor
            .take()
            .ok_or_else(|| ChannelError::Closed("bridge already started".to_string()))?;
        let mut processor_task: JoinHandle<xm2toot_core::Result<()>> =
            tokio::spawn(processor.run(commands));

        info!("Joining {} as {}", self.settings.room, self.settings.nick);
        let result = match self
            .transport
            .join_room(&self.settings.room, &self.settings.nick)
            .await
        {
            Ok(()) => loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.shutdown().await;
                        break Ok(());
                    }
                    event = self.transport.next_event() => {
                        if let Err(e) = self.handle_event(event).await {
                            break Err(e);
                        }
                    }
                    message = outbound.recv(), if self.joined => {
                        let Some(message) = message else {
                            break Err(ChannelError::Closed("outbound queue closed".to_string()));
                        };
                        if message.is_empty() {
                            debug!("Skipping empty {:?} message", message.source);
                            continue;
                        }
                        if let Err(e) = self.transport.send_room(&message.content).await {
                            break Err(e);
                        }
                    }
                    finished = &mut processor_task => {
                        let reason = match finished {
                            Ok(Ok(())) => "command processor stopped".to_string(),
                            Ok(Err(e)) => format!("command processor failed: {}", e),
                            Err(e) => format!("command processor panicked: {}", e),
                        };
                        break Err(ChannelError::Closed(reason));
                    }
                }
            },
            Err(e) => Err(e),
        };

        processor_task.abort();
        result
    }

    async fn handle_event(&mut self, event: Result<Option<ChatEvent>>) -> Result<()> {
        match event? {
            Some(ChatEvent::Joined { nick }) => {
                info!("Joined {} as {}", self.settings.room, nick);
                self.own_nick = nick;
                self.joined = true;
                Ok(())
            }
            Some(ChatEvent::JoinFailed(reason)) => {
                error!("Failed to join {}: {}", self.settings.room, reason);
                Err(ChannelError::JoinFailed(reason))
            }
            Some(ChatEvent::Room(message)) => self.handle_room_message(message),
            Some(ChatEvent::Direct(message)) => self.handle_direct_message(message).await,
            Some(ChatEvent::Disconnected(reason)) => {
                error!("Chat connection lost: {}", reason);
                Err(ChannelError::ConnectionFailed(reason))
            }
            None => Err(ChannelError::Closed("transport shut down".to_string())),
        }
    }

    fn handle_room_message(&self, message: RoomMessage) -> Result<()> {
        if message.nick == self.own_nick {
            return Ok(());
        }
        if let Some(text) = extract_command(&message.body, &self.own_nick) {
            self.bus.publish_command(Command::new(text, message.nick))?;
        }
        Ok(())
    }

    async fn handle_direct_message(&mut self, message: DirectMessage) -> Result<()> {
        if message.body.trim().is_empty() {
            return Ok(());
        }
        if message.body == QUIT_COMMAND && self.settings.is_admin(&message.from) {
            info!("Quit requested by {}", message.from);
            self.stop.trigger("quit command");
            return Ok(());
        }
        debug!("Echoing direct message from {}", message.from);
        self.transport
            .send_direct(&message.from, &message.body)
            .await
    }

    async fn shutdown(&mut self) {
        info!("Leaving {}", self.settings.room);
        if let Err(e) = self.transport.leave_room().await {
            warn!("Failed to leave {}: {}", self.settings.room, e);
        }
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close chat connection: {}", e);
        }
    }
}
