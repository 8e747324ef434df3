//! Chat platform capability used by the routing engine.
//!
//! The engine only needs three things from Discord: re-fetch a message, add a
//! reaction, and know who the bot is. [`ChatSession`] exposes exactly that so
//! the router, dispatcher and tracker can run against an in-memory fake.

use async_trait::async_trait;

use crate::error::ChatError;
use crate::message::MessageSnapshot;

/// Narrow chat-platform capability.
///
/// Implementations must be `Send + Sync` to be shared across event handlers
/// and the acknowledgement poller.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Fetch the current full state of a message.
    async fn fetch_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<MessageSnapshot, ChatError>;

    /// Add a reaction as the bot. Adding a reaction the bot already holds is a no-op.
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChatError>;

    /// The bot's own user id, if known yet.
    fn bot_user_id(&self) -> Option<String>;
}

impl std::fmt::Debug for dyn ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("bot_user_id", &self.bot_user_id())
            .finish()
    }
}

/// Inbound chat event, already normalized from the gateway wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A new message, delivered in full.
    MessageCreate(MessageSnapshot),
    /// A message edit. Only identifiers are kept; the message is re-fetched.
    MessageUpdate {
        channel_id: String,
        message_id: String,
        /// Author from the partial delta, when present.
        author_id: Option<String>,
    },
    /// A reaction added by `user_id`.
    ReactionAdd {
        channel_id: String,
        message_id: String,
        user_id: String,
    },
}

impl ChatEvent {
    /// Short label used in logs and the `kind` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::MessageCreate(_) => "message_create",
            ChatEvent::MessageUpdate { .. } => "message_update",
            ChatEvent::ReactionAdd { .. } => "reaction_add",
        }
    }

    pub fn message_id(&self) -> &str {
        match self {
            ChatEvent::MessageCreate(message) => &message.id,
            ChatEvent::MessageUpdate { message_id, .. }
            | ChatEvent::ReactionAdd { message_id, .. } => message_id,
        }
    }
}
