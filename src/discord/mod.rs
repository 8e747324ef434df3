//! Discord collaborator: REST client and gateway session.
//!
//! - [`DiscordClient`] implements [`crate::chat::ChatSession`] over the REST API
//! - [`Gateway`] turns websocket DISPATCH events into [`crate::chat::ChatEvent`]s
//!
//! The two share the bot identity: the gateway records it from `READY`, the
//! REST client falls back to `GET /users/@me`.

pub mod gateway;
pub mod model;
pub mod rest;

pub use gateway::{DEFAULT_GATEWAY_URL, GATEWAY_INTENTS, Gateway};
pub use rest::{DEFAULT_DISCORD_API_URL, DiscordClient};
