//! Discord gateway client.
//!
//! Maintains the websocket session that delivers message and reaction events,
//! including reconnection with exponential backoff.
//!
//! # Session lifecycle
//!
//! ```text
//! connect -> HELLO -> IDENTIFY -> READY (bot id recorded)
//!                        |
//!                        +-- heartbeat every heartbeat_interval
//!                        +-- DISPATCH events --> mpsc --> router
//! ```
//!
//! Sessions are never resumed: every (re)connection identifies again and
//! events emitted while disconnected are lost. Backoff runs from 1s to 60s and
//! resets once a session reaches `READY`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::{
    GatewayPayload, Hello, Identify, IdentifyProperties, Message, MessageUpdate, OutboundPayload,
    ReactionAdd, Ready, opcode,
};
use super::rest::DiscordClient;
use crate::chat::ChatEvent;
use crate::config::SecretString;
use crate::error::GatewayError;
use crate::notify::backoff_delay;

/// Discord gateway endpoint (API v10, JSON encoding).
pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Gateway intents: guild and DM messages and reactions, plus message content.
pub const GATEWAY_INTENTS: u64 = (1 << 9) // GUILD_MESSAGES
    | (1 << 10) // GUILD_MESSAGE_REACTIONS
    | (1 << 12) // DIRECT_MESSAGES
    | (1 << 13) // DIRECT_MESSAGE_REACTIONS
    | (1 << 15); // MESSAGE_CONTENT

/// Base delay for reconnection backoff.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum delay for reconnection backoff.
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// How long to wait for HELLO after connecting.
const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

/// Close codes after which reconnecting cannot succeed.
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

/// A decoded DISPATCH event the gateway acts on.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Ready(Ready),
    Chat(ChatEvent),
}

/// Decode a DISPATCH payload. Unknown event types yield `None`.
pub(crate) fn parse_dispatch(
    event_type: &str,
    data: serde_json::Value,
) -> Result<Option<Dispatch>, GatewayError> {
    let invalid = |e: serde_json::Error| GatewayError::Protocol(format!("{}: {}", event_type, e));

    let dispatch = match event_type {
        "READY" => Dispatch::Ready(serde_json::from_value(data).map_err(invalid)?),
        "MESSAGE_CREATE" => {
            let message: Message = serde_json::from_value(data).map_err(invalid)?;
            Dispatch::Chat(ChatEvent::MessageCreate(message.into()))
        }
        "MESSAGE_UPDATE" => {
            let update: MessageUpdate = serde_json::from_value(data).map_err(invalid)?;
            Dispatch::Chat(ChatEvent::MessageUpdate {
                channel_id: update.channel_id,
                message_id: update.id,
                author_id: update.author.map(|a| a.id),
            })
        }
        "MESSAGE_REACTION_ADD" => {
            let reaction: ReactionAdd = serde_json::from_value(data).map_err(invalid)?;
            Dispatch::Chat(ChatEvent::ReactionAdd {
                channel_id: reaction.channel_id,
                message_id: reaction.message_id,
                user_id: reaction.user_id,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(dispatch))
}

/// How a session ended without error.
enum SessionEnd {
    Cancelled,
    Reconnect(&'static str),
}

/// Discord gateway client feeding normalized events into a channel.
pub struct Gateway {
    url: String,
    token: SecretString,
    client: Arc<DiscordClient>,
    events: mpsc::Sender<ChatEvent>,
}

impl Gateway {
    pub fn new(
        token: SecretString,
        client: Arc<DiscordClient>,
        events: mpsc::Sender<ChatEvent>,
    ) -> Self {
        Self::with_url(DEFAULT_GATEWAY_URL, token, client, events)
    }

    pub fn with_url(
        url: impl Into<String>,
        token: SecretString,
        client: Arc<DiscordClient>,
        events: mpsc::Sender<ChatEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            token,
            client,
            events,
        }
    }

    /// Run sessions until cancelled, reconnecting with backoff.
    ///
    /// # Errors
    ///
    /// Returns an error only when reconnecting cannot help: the gateway
    /// rejected the token or intents, or the event receiver was dropped.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), GatewayError> {
        let mut attempt: u32 = 0;

        loop {
            info!(url = %self.url, "Connecting to Discord gateway");
            let mut reached_ready = false;

            match self.run_session(&cancel, &mut reached_ready).await {
                Ok(SessionEnd::Cancelled) => {
                    info!("Discord gateway stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect(reason)) => {
                    info!(reason = %reason, "Gateway session ended, reconnecting");
                }
                Err(e @ (GatewayError::AuthenticationFailed(_) | GatewayError::ChannelClosed)) => {
                    error!(error = %e, "Gateway cannot continue");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "Gateway session failed");
                }
            }

            if reached_ready {
                attempt = 0;
            }
            let delay = backoff_delay(attempt, BACKOFF_BASE, BACKOFF_MAX);
            log_reconnection_attempt(attempt, delay);
            attempt = attempt.saturating_add(1);

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Discord gateway stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn run_session(
        &self,
        cancel: &CancellationToken,
        reached_ready: &mut bool,
    ) -> Result<SessionEnd, GatewayError> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let hello = tokio::time::timeout(HELLO_TIMEOUT, async {
            while let Some(frame) = source.next().await {
                let frame = frame.map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
                if let Some(payload) = decode_frame(frame)?
                    && payload.op == opcode::HELLO
                {
                    let data = payload.d.unwrap_or_default();
                    return serde_json::from_value::<Hello>(data)
                        .map_err(|e| GatewayError::Protocol(format!("HELLO: {}", e)));
                }
            }
            Err(GatewayError::ConnectionFailed(
                "connection closed before HELLO".to_string(),
            ))
        })
        .await
        .map_err(|_| GatewayError::Protocol("timed out waiting for HELLO".to_string()))??;

        let heartbeat_every = Duration::from_millis(hello.heartbeat_interval.max(1));
        debug!(heartbeat_ms = heartbeat_every.as_millis(), "Received HELLO");

        send_json(
            &mut sink,
            &OutboundPayload {
                op: opcode::IDENTIFY,
                d: Identify {
                    token: self.token.expose(),
                    intents: GATEWAY_INTENTS,
                    properties: IdentifyProperties {
                        os: std::env::consts::OS,
                        browser: env!("CARGO_PKG_NAME"),
                        device: env!("CARGO_PKG_NAME"),
                    },
                },
            },
        )
        .await?;

        let mut heartbeat = tokio::time::interval(heartbeat_every);
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return Ok(SessionEnd::Reconnect("heartbeat not acknowledged"));
                    }
                    send_heartbeat(&mut sink, sequence).await?;
                    awaiting_ack = true;
                }
                frame = source.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => return Err(GatewayError::ConnectionFailed(e.to_string())),
                        None => return Ok(SessionEnd::Reconnect("stream ended")),
                    };

                    if let WsMessage::Close(close) = &frame {
                        let code = close.as_ref().map(|c| u16::from(c.code));
                        if let Some(code) = code.filter(|c| FATAL_CLOSE_CODES.contains(c)) {
                            return Err(GatewayError::AuthenticationFailed(code));
                        }
                        debug!(code = ?code, "Gateway closed the connection");
                        return Ok(SessionEnd::Reconnect("closed by gateway"));
                    }

                    let Some(payload) = decode_frame(frame)? else {
                        continue;
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }

                    match payload.op {
                        opcode::DISPATCH => {
                            let event_type = payload.t.unwrap_or_default();
                            let data = payload.d.unwrap_or_default();
                            match parse_dispatch(&event_type, data) {
                                Ok(Some(Dispatch::Ready(ready))) => {
                                    info!(
                                        bot_id = %ready.user.id,
                                        username = %ready.user.username,
                                        session_id = %ready.session_id,
                                        "Discord gateway ready"
                                    );
                                    self.client.set_bot_user_id(ready.user.id);
                                    *reached_ready = true;
                                }
                                Ok(Some(Dispatch::Chat(event))) => {
                                    debug!(kind = event.kind(), message_id = %event.message_id(), "Gateway event");
                                    self.events
                                        .send(event)
                                        .await
                                        .map_err(|_| GatewayError::ChannelClosed)?;
                                }
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, "Skipping undecodable gateway event"),
                            }
                        }
                        opcode::HEARTBEAT => send_heartbeat(&mut sink, sequence).await?,
                        opcode::HEARTBEAT_ACK => awaiting_ack = false,
                        opcode::RECONNECT => return Ok(SessionEnd::Reconnect("gateway requested reconnect")),
                        opcode::INVALID_SESSION => return Ok(SessionEnd::Reconnect("invalid session")),
                        other => debug!(op = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("url", &self.url)
            .field("token", &self.token)
            .finish()
    }
}

/// Decode a text or binary frame into a gateway payload. Control frames yield `None`.
fn decode_frame(frame: WsMessage) -> Result<Option<GatewayPayload>, GatewayError> {
    let payload = match frame {
        WsMessage::Text(text) => serde_json::from_str(text.as_str()),
        WsMessage::Binary(bytes) => serde_json::from_slice(&bytes),
        _ => return Ok(None),
    };
    payload
        .map(Some)
        .map_err(|e| GatewayError::Protocol(format!("invalid payload: {}", e)))
}

async fn send_json<S, T>(sink: &mut S, payload: &T) -> Result<(), GatewayError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
    T: Serialize,
{
    let json = serde_json::to_string(payload)
        .map_err(|e| GatewayError::Protocol(format!("encode: {}", e)))?;
    sink.send(WsMessage::Text(json.into()))
        .await
        .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))
}

async fn send_heartbeat<S>(sink: &mut S, sequence: Option<u64>) -> Result<(), GatewayError>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    send_json(
        sink,
        &OutboundPayload {
            op: opcode::HEARTBEAT,
            d: sequence,
        },
    )
    .await
}

/// Log the reconnection attempt and count it.
fn log_reconnection_attempt(attempt: u32, delay: Duration) {
    warn!(
        attempt = attempt,
        delay_secs = delay.as_secs(),
        "Gateway disconnected, retrying"
    );
    metrics::counter!("d2p_gateway_reconnections_total").increment(1);
}
