//! discord2pushover - Route Discord messages and reactions to Pushover.
//!
//! Gateway events flow through the [`EventRouter`], which evaluates the
//! configured rules against a fresh message snapshot and hands the first
//! match to the [`Dispatcher`]. Emergency notifications are followed up by
//! the [`AckTracker`] until they are acknowledged or expire.

pub mod chat;
pub mod cli;
pub mod config;
pub mod discord;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod metrics;
pub mod notify;
pub mod priority;
pub mod router;
pub mod rules;
pub mod tracker;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use chat::{ChatEvent, ChatSession};
pub use cli::LogFormat;
pub use discord::{DiscordClient, Gateway};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use message::{MessageSnapshot, ReactionSnapshot};
pub use metrics::{MetricsServer, initialize_metrics, register_metric_descriptions};
pub use notify::{PushService, PushoverClient, backoff_delay};
pub use priority::PriorityOrder;
pub use router::{EventOutcome, EventRouter};
pub use tracker::AckTracker;
