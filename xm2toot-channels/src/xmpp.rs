//! XMPP transport built on tokio-xmpp
//!
//! The client lives in a driver task that owns the stream. The transport
//! talks to it over channels: stanzas to send go in, and stream events
//! come out and are turned into [`ChatEvent`]s.

use crate::base::{ChannelError, ChatEvent, ChatTransport, DirectMessage, Result, RoomMessage};
use async_trait::async_trait;
use futures::StreamExt;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_xmpp::parsers::delay::Delay;
use tokio_xmpp::parsers::jid::{BareJid, Jid};
use tokio_xmpp::parsers::message::{Body, Message, MessageType};
use tokio_xmpp::parsers::minidom::Element;
use tokio_xmpp::parsers::muc::muc::History;
use tokio_xmpp::parsers::muc::user::Status;
use tokio_xmpp::parsers::muc::{Muc, MucUser};
use tokio_xmpp::parsers::ns;
use tokio_xmpp::parsers::presence::{Presence, Type as PresenceType};
use tokio_xmpp::{AsyncClient, Event};
use tracing::{debug, info, warn};
use xm2toot_core::config::XmppConfig;

// `xmpp_parsers::message::Lang` is a private alias for `String`.
type Lang = String;

const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

enum Request {
    Stanza(Element),
    End,
}

#[derive(Debug)]
enum DriverEvent {
    Online,
    Stanza(Element),
    Disconnected(String),
}

/// Chat transport over a client-to-server XMPP stream
pub struct XmppTransport {
    requests: mpsc::UnboundedSender<Request>,
    events: mpsc::UnboundedReceiver<DriverEvent>,
    driver: JoinHandle<()>,
    room: Option<BareJid>,
    nick: String,
}

impl XmppTransport {
    /// Connect and authenticate, waiting until the session is online
    pub async fn connect(config: &XmppConfig, timeout: Duration) -> Result<Self> {
        let jid = BareJid::from_str(&config.username)
            .map_err(|e| ChannelError::InvalidConfig(format!("xmpp.username: {}", e)))?;
        let password = config.password.clone();

        let (requests, mut request_rx) = mpsc::unbounded_channel::<Request>();
        let (event_tx, mut events) = mpsc::unbounded_channel::<DriverEvent>();

        info!("Connecting to XMPP server as {}", jid);
        let driver = tokio::spawn(async move {
            let mut client = AsyncClient::new(jid, password);
            loop {
                tokio::select! {
                    request = request_rx.recv() => match request {
                        Some(Request::Stanza(stanza)) => {
                            if let Err(e) = client.send_stanza(stanza).await {
                                let _ = event_tx.send(DriverEvent::Disconnected(e.to_string()));
                                break;
                            }
                        }
                        Some(Request::End) | None => {
                            if let Err(e) = client.send_end().await {
                                debug!("Error closing XMPP stream: {}", e);
                            }
                            break;
                        }
                    },
                    event = client.next() => match event {
                        Some(Event::Online { .. }) => {
                            // Without available presence the server routes no
                            // bare-JID chat messages to this resource.
                            if let Err(e) = client.send_stanza(initial_presence().into()).await {
                                let _ = event_tx.send(DriverEvent::Disconnected(e.to_string()));
                                break;
                            }
                            let _ = event_tx.send(DriverEvent::Online);
                        }
                        Some(Event::Stanza(stanza)) => {
                            let _ = event_tx.send(DriverEvent::Stanza(stanza));
                        }
                        Some(Event::Disconnected(e)) => {
                            let _ = event_tx.send(DriverEvent::Disconnected(e.to_string()));
                            break;
                        }
                        None => {
                            let _ = event_tx.send(DriverEvent::Disconnected("stream ended".to_string()));
                            break;
                        }
                    },
                }
            }
            debug!("XMPP driver stopped");
        });

        let online = tokio::time::timeout(timeout, async {
            while let Some(event) = events.recv().await {
                match event {
                    DriverEvent::Online => return Ok(()),
                    DriverEvent::Disconnected(reason) => {
                        return Err(ChannelError::ConnectionFailed(reason))
                    }
                    DriverEvent::Stanza(_) => continue,
                }
            }
            Err(ChannelError::ConnectionFailed(
                "XMPP driver stopped before going online".to_string(),
            ))
        })
        .await
        .unwrap_or_else(|_| {
            Err(ChannelError::ConnectionFailed(format!(
                "not online after {}s",
                timeout.as_secs()
            )))
        });

        if let Err(e) = online {
            driver.abort();
            return Err(e);
        }
        info!("XMPP session online");

        Ok(Self {
            requests,
            events,
            driver,
            room: None,
            nick: String::new(),
        })
    }

    fn send(&self, stanza: impl Into<Element>) -> Result<()> {
        self.requests
            .send(Request::Stanza(stanza.into()))
            .map_err(|_| ChannelError::SendFailed("XMPP connection closed".to_string()))
    }
}

impl Drop for XmppTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[async_trait]
impl ChatTransport for XmppTransport {
    async fn join_room(&mut self, room: &str, nick: &str) -> Result<()> {
        let room = BareJid::from_str(room)
            .map_err(|e| ChannelError::InvalidConfig(format!("xmpp.muc: {}", e)))?;
        let presence = join_presence(&room, nick)?;
        self.room = Some(room);
        self.nick = nick.to_string();
        self.send(presence)
    }

    async fn send_room(&mut self, body: &str) -> Result<()> {
        let Some(room) = &self.room else {
            return Err(ChannelError::SendFailed("not in a room".to_string()));
        };
        self.send(message(Jid::from(room.clone()), MessageType::Groupchat, body))
    }

    async fn send_direct(&mut self, to: &str, body: &str) -> Result<()> {
        let to = Jid::from_str(to)
            .map_err(|e| ChannelError::SendFailed(format!("invalid recipient {}: {}", to, e)))?;
        self.send(message(to, MessageType::Chat, body))
    }

    async fn leave_room(&mut self) -> Result<()> {
        let Some(room) = &self.room else {
            return Ok(());
        };
        self.send(leave_presence(room, &self.nick)?)
    }

    async fn close(&mut self) -> Result<()> {
        let _ = self.requests.send(Request::End);
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut self.driver)
            .await
            .is_err()
        {
            warn!("XMPP stream did not close within {:?}", CLOSE_TIMEOUT);
            self.driver.abort();
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        loop {
            let Some(event) = self.events.recv().await else {
                return Ok(None);
            };
            match event {
                DriverEvent::Online => debug!("XMPP session online again"),
                DriverEvent::Disconnected(reason) => {
                    return Ok(Some(ChatEvent::Disconnected(reason)))
                }
                DriverEvent::Stanza(stanza) => {
                    if let Some(event) = stanza_to_event(stanza, self.room.as_ref(), &self.nick) {
                        if let ChatEvent::Joined { nick } = &event {
                            self.nick = nick.clone();
                        }
                        return Ok(Some(event));
                    }
                }
            }
        }
    }
}

/// Available presence announced once the session is online
pub fn initial_presence() -> Presence {
    Presence::new(PresenceType::None)
}

fn occupant(room: &BareJid, nick: &str) -> Result<Jid> {
    Jid::from_str(&format!("{}/{}", room, nick))
        .map_err(|e| ChannelError::InvalidConfig(format!("xmpp.muc_nick {:?}: {}", nick, e)))
}

/// Presence joining `room` as `nick` without history
pub fn join_presence(room: &BareJid, nick: &str) -> Result<Presence> {
    let muc = Muc::new().with_history(History::new().with_maxstanzas(0));
    let mut presence = Presence::new(PresenceType::None);
    presence.to = Some(occupant(room, nick)?);
    presence.payloads.push(muc.into());
    Ok(presence)
}

pub fn leave_presence(room: &BareJid, nick: &str) -> Result<Presence> {
    let mut presence = Presence::new(PresenceType::Unavailable);
    presence.to = Some(occupant(room, nick)?);
    Ok(presence)
}

pub fn message(to: Jid, kind: MessageType, body: &str) -> Message {
    let mut message = Message::new(Some(to));
    message.type_ = kind;
    message.bodies.insert(Lang::new(), Body(body.to_string()));
    message
}

fn in_room(from: &Jid, room: Option<&BareJid>) -> bool {
    room.is_some_and(|room| from.to_bare() == *room)
}

/// Translate an incoming stanza for the session in `room` as `nick`
///
/// Returns `None` for stanzas the bridge does not act on.
pub fn stanza_to_event(stanza: Element, room: Option<&BareJid>, nick: &str) -> Option<ChatEvent> {
    if stanza.is("message", ns::DEFAULT_NS) {
        match Message::try_from(stanza) {
            Ok(message) => message_to_event(message, room),
            Err(e) => {
                debug!("Ignoring unparsable message: {}", e);
                None
            }
        }
    } else if stanza.is("presence", ns::DEFAULT_NS) {
        match Presence::try_from(stanza) {
            Ok(presence) => presence_to_event(presence, room, nick),
            Err(e) => {
                debug!("Ignoring unparsable presence: {}", e);
                None
            }
        }
    } else {
        None
    }
}

fn message_to_event(message: Message, room: Option<&BareJid>) -> Option<ChatEvent> {
    let from = message.from.as_ref()?;
    let body = message
        .bodies
        .get(&Lang::default())
        .or_else(|| message.bodies.values().next())?
        .0
        .clone();

    match message.type_ {
        MessageType::Groupchat => {
            if !in_room(from, room) {
                return None;
            }
            let delayed = message
                .payloads
                .iter()
                .any(|payload| Delay::try_from(payload.clone()).is_ok());
            if delayed {
                debug!("Skipping delayed room message from {}", from);
                return None;
            }
            let nick = from.resource()?.to_string();
            Some(ChatEvent::Room(RoomMessage::new(nick, body)))
        }
        MessageType::Chat | MessageType::Normal => Some(ChatEvent::Direct(DirectMessage {
            from: from.to_string(),
            body,
        })),
        kind => {
            debug!("Ignoring {:?} message from {}", kind, from);
            None
        }
    }
}

fn presence_to_event(presence: Presence, room: Option<&BareJid>, nick: &str) -> Option<ChatEvent> {
    let from = presence.from.as_ref()?;
    if !in_room(from, room) {
        return None;
    }
    let occupant = from.resource().map(|resource| resource.to_string());

    let self_presence = presence
        .payloads
        .iter()
        .filter_map(|payload| MucUser::try_from(payload.clone()).ok())
        .any(|user| {
            user.status
                .iter()
                .any(|status| matches!(status, Status::SelfPresence))
        });
    let is_self = self_presence || occupant.as_deref() == Some(nick);

    match presence.type_ {
        PresenceType::Error => Some(ChatEvent::JoinFailed(presence_error(&presence))),
        PresenceType::Unavailable if is_self => {
            Some(ChatEvent::Disconnected(format!("removed from {}", from.to_bare())))
        }
        PresenceType::None if is_self => occupant.map(|nick| ChatEvent::Joined { nick }),
        _ => None,
    }
}

fn presence_error(presence: &Presence) -> String {
    let Some(error) = presence
        .payloads
        .iter()
        .find(|payload| payload.is("error", ns::DEFAULT_NS))
    else {
        return "unknown error".to_string();
    };
    let condition = error
        .children()
        .find(|c| c.name() != "text")
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| "unknown error".to_string());
    let text = error
        .children()
        .find(|c| c.name() == "text")
        .map(Element::text);
    match text {
        Some(text) if !text.is_empty() => format!("{} ({})", condition, text),
        _ => condition,
    }
}
