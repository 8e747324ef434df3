//! Event routing: normalizes chat events and drives rule evaluation.
//!
//! Three entry points converge on the rule selector:
//!
//! - **Create**: the message as delivered, evaluated with no baseline.
//! - **Update**: the partial delta is discarded and the message is re-fetched.
//! - **Reaction add**: ignored if the bot reacted; otherwise re-fetched.
//!
//! Messages authored by the bot are ignored on every path.
//!
//! # Architecture
//!
//! ```text
//! gateway --mpsc--> EventRouter::run
//!                       |
//!                       +-- spawn --> handle(event_1) --> rules.rs --> dispatch.rs
//!                       +-- spawn --> handle(event_2) --> ...
//! ```
//!
//! Handlers run concurrently in a `JoinSet`. A panicking handler is logged
//! and does not affect the others.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatEvent, ChatSession};
use crate::config::Rule;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::message::MessageSnapshot;
use crate::priority::PriorityOrder;
use crate::rules::{previously_notified, select};

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The message was authored by the bot.
    IgnoredOwnMessage,
    /// The reaction was added by the bot.
    IgnoredOwnReaction,
    /// The message could not be re-fetched.
    FetchFailed(String),
    /// No rule matched.
    NoMatch,
    /// A rule matched and its actions ran.
    Matched {
        rule_name: String,
        rule_index: usize,
        dispatch: DispatchOutcome,
    },
}

/// Routes chat events through rule selection and dispatch.
pub struct EventRouter {
    chat: Arc<dyn ChatSession>,
    dispatcher: Dispatcher,
    rules: Arc<[Rule]>,
    order: PriorityOrder,
}

impl EventRouter {
    pub fn new(
        chat: Arc<dyn ChatSession>,
        dispatcher: Dispatcher,
        rules: Arc<[Rule]>,
        order: PriorityOrder,
    ) -> Self {
        Self {
            chat,
            dispatcher,
            rules,
            order,
        }
    }

    /// Handle one event to completion.
    pub async fn handle(&self, event: ChatEvent) -> EventOutcome {
        metrics::counter!("d2p_events_total", "kind" => event.kind()).increment(1);

        let outcome = match event {
            ChatEvent::MessageCreate(message) => self.on_message_create(message).await,
            ChatEvent::MessageUpdate {
                channel_id,
                message_id,
                author_id,
            } => {
                self.on_message_update(&channel_id, &message_id, author_id.as_deref())
                    .await
            }
            ChatEvent::ReactionAdd {
                channel_id,
                message_id,
                user_id,
            } => self.on_reaction_add(&channel_id, &message_id, &user_id).await,
        };

        debug!(outcome = ?outcome, "Event handled");
        outcome
    }

    /// A freshly created message cannot carry a bot reaction yet, so it is
    /// evaluated without a baseline.
    pub async fn on_message_create(&self, message: MessageSnapshot) -> EventOutcome {
        let bot_id = self.chat.bot_user_id();
        if is_bot(bot_id.as_deref(), &message.author_id) {
            debug!(message_id = %message.id, "Ignoring message created by the bot itself");
            return EventOutcome::IgnoredOwnMessage;
        }

        info!(
            message_id = %message.id,
            channel_id = %message.channel_id,
            author_id = %message.author_id,
            "Processing new message"
        );
        self.evaluate(&message, bot_id.as_deref(), None).await
    }

    pub async fn on_message_update(
        &self,
        channel_id: &str,
        message_id: &str,
        author_id: Option<&str>,
    ) -> EventOutcome {
        let bot_id = self.chat.bot_user_id();
        if author_id.is_some_and(|author| is_bot(bot_id.as_deref(), author)) {
            debug!(message_id = %message_id, "Ignoring edit of a message authored by the bot itself");
            return EventOutcome::IgnoredOwnMessage;
        }

        info!(message_id = %message_id, channel_id = %channel_id, "Processing message edit");
        self.refetch_and_evaluate(channel_id, message_id, bot_id.as_deref())
            .await
    }

    pub async fn on_reaction_add(
        &self,
        channel_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> EventOutcome {
        let bot_id = self.chat.bot_user_id();
        if is_bot(bot_id.as_deref(), user_id) {
            debug!(message_id = %message_id, "Ignoring reaction added by the bot itself");
            return EventOutcome::IgnoredOwnReaction;
        }

        info!(
            message_id = %message_id,
            channel_id = %channel_id,
            user_id = %user_id,
            "Processing reaction"
        );
        self.refetch_and_evaluate(channel_id, message_id, bot_id.as_deref())
            .await
    }

    async fn refetch_and_evaluate(
        &self,
        channel_id: &str,
        message_id: &str,
        bot_id: Option<&str>,
    ) -> EventOutcome {
        let message = match self.chat.fetch_message(channel_id, message_id).await {
            Ok(message) => message,
            Err(e) => {
                error!(
                    message_id = %message_id,
                    channel_id = %channel_id,
                    error = %e,
                    "Failed to fetch full message"
                );
                return EventOutcome::FetchFailed(e.to_string());
            }
        };

        if is_bot(bot_id, &message.author_id) {
            debug!(message_id = %message_id, "Ignoring message authored by the bot itself");
            return EventOutcome::IgnoredOwnMessage;
        }

        let baseline = previously_notified(&message, &self.rules, self.order);
        debug!(message_id = %message_id, baseline = ?baseline, "Previously notified priority");
        self.evaluate(&message, bot_id, baseline).await
    }

    async fn evaluate(
        &self,
        message: &MessageSnapshot,
        bot_id: Option<&str>,
        baseline: Option<i32>,
    ) -> EventOutcome {
        let Some((rule, index)) = select(message, &self.rules, bot_id) else {
            return EventOutcome::NoMatch;
        };

        info!(
            rule_index = index + 1,
            rule_name = %rule.name,
            message_id = %message.id,
            "Rule matched, running actions"
        );
        metrics::counter!("d2p_rules_matched_total", "rule_name" => rule.name.clone())
            .increment(1);

        let dispatch = self.dispatcher.dispatch(message, rule, baseline).await;
        EventOutcome::Matched {
            rule_name: rule.name.clone(),
            rule_index: index,
            dispatch,
        }
    }

    /// Consume events until the channel closes or `cancel` fires.
    ///
    /// Each event is handled in its own task. On shutdown, handlers already
    /// running are awaited; the caller bounds that wait with a timeout.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChatEvent>, cancel: CancellationToken) {
        info!(rule_count = self.rules.len(), "Event router started");
        let mut tasks: JoinSet<EventOutcome> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Event router received shutdown signal");
                    break;
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!("Event channel closed, router stopping");
                        break;
                    };
                    let router = Arc::clone(&self);
                    tasks.spawn(async move { router.handle(event).await });
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join_result(result);
                }
            }
        }

        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight event handlers");
        }
        while let Some(result) = tasks.join_next().await {
            log_join_result(result);
        }
        info!("Event router stopped");
    }
}

fn is_bot(bot_id: Option<&str>, user_id: &str) -> bool {
    bot_id.is_some_and(|bot| bot == user_id)
}

fn log_join_result(result: Result<EventOutcome, tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Event handler panicked");
        } else {
            warn!(error = %e, "Event handler cancelled");
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("rule_count", &self.rules.len())
            .field("order", &self.order)
            .finish()
    }
}
