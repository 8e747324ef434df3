//! Discord wire types (REST and gateway JSON).
//!
//! Only the fields the router needs are modeled; everything else is ignored
//! by serde.

use serde::{Deserialize, Serialize};

use crate::message::{MessageSnapshot, ReactionSnapshot};

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Emoji {
    /// Set for custom emoji only.
    #[serde(default)]
    pub id: Option<String>,
    /// Unicode character, or the custom emoji's name.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reaction {
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub me: bool,
    pub emoji: Emoji,
}

/// Full message object, as returned by `GET /channels/{c}/messages/{m}`
/// and carried by `MESSAGE_CREATE`.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mentions: Vec<User>,
    #[serde(default)]
    pub mention_roles: Vec<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl From<Message> for MessageSnapshot {
    fn from(message: Message) -> Self {
        MessageSnapshot {
            id: message.id,
            channel_id: message.channel_id,
            guild_id: message.guild_id.filter(|g| !g.is_empty()),
            author_id: message.author.id,
            content: message.content,
            mentions: message.mentions.into_iter().map(|u| u.id).collect(),
            mention_roles: message.mention_roles,
            reactions: message
                .reactions
                .into_iter()
                .filter_map(|r| {
                    let name = r.emoji.name?;
                    Some(ReactionSnapshot::new(name, r.me))
                })
                .collect(),
        }
    }
}

/// `MESSAGE_UPDATE` payload. Edits may be partial, so only ids are required.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageUpdate {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub author: Option<User>,
}

/// `MESSAGE_REACTION_ADD` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionAdd {
    pub user_id: String,
    pub channel_id: String,
    pub message_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub emoji: Emoji,
}

/// `READY` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Ready {
    pub user: User,
    #[serde(default)]
    pub session_id: String,
}

/// `HELLO` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}

/// Gateway envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Option<serde_json::Value>,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

/// Gateway opcodes used by the client.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

#[derive(Debug, Serialize)]
pub struct IdentifyProperties {
    pub os: &'static str,
    pub browser: &'static str,
    pub device: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Identify<'a> {
    pub token: &'a str,
    pub intents: u64,
    pub properties: IdentifyProperties,
}

/// Outbound gateway frame.
#[derive(Debug, Serialize)]
pub struct OutboundPayload<T: Serialize> {
    pub op: u8,
    pub d: T,
}

/// Error body returned by the REST API.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: i64,
}

/// Body of a 429 response.
#[derive(Debug, Deserialize)]
pub struct RateLimited {
    pub retry_after: f64,
}
