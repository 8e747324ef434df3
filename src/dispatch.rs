//! Notification dispatch for a matched rule.
//!
//! Given a message, the rule it matched and the previously-notified baseline,
//! the dispatcher:
//!
//! 1. skips the send when the rule has no destination, or when suppression
//!    applies (a notification at least as urgent was already sent);
//! 2. otherwise sends the notification, registering emergency receipts with
//!    the [`AckTracker`];
//! 3. requests the rule's reaction emoji whatever happened in step 1 or 2.
//!
//! Failures are logged and reported in the [`DispatchOutcome`]; nothing is
//! rolled back.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info, warn};

use crate::chat::ChatSession;
use crate::config::Rule;
use crate::message::MessageSnapshot;
use crate::notify::{EmergencyTiming, PushNotification, PushService};
use crate::priority::{HIGH_PRIORITY, PriorityOrder, is_emergency};
use crate::tracker::{AckTracker, TrackedNotification};

/// Tracking window used when an emergency rule has a non-positive `expire`.
pub const DEFAULT_TRACKING_EXPIRE_SECS: i64 = 3600;

/// What happened to the notification send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the push service. `receipt` is set for emergency sends.
    Sent { receipt: Option<String> },
    /// Skipped: a notification at least as urgent as `baseline` was already sent.
    Suppressed { baseline: i32 },
    /// Skipped: the rule has no destination.
    NoDestination,
    /// The push service returned an error.
    Failed(String),
}

/// What happened to the rule's reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    NotConfigured,
    Applied,
    Failed(String),
}

/// Side effects of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub send: SendOutcome,
    pub reaction: ReactionOutcome,
    /// True if an emergency receipt was registered for acknowledgement tracking.
    pub tracked: bool,
}

/// Executes rule actions against the push and chat collaborators.
pub struct Dispatcher {
    push: Arc<dyn PushService>,
    chat: Arc<dyn ChatSession>,
    tracker: Arc<AckTracker>,
    order: PriorityOrder,
}

impl Dispatcher {
    pub fn new(
        push: Arc<dyn PushService>,
        chat: Arc<dyn ChatSession>,
        tracker: Arc<AckTracker>,
        order: PriorityOrder,
    ) -> Self {
        Self {
            push,
            chat,
            tracker,
            order,
        }
    }

    pub fn tracker(&self) -> &Arc<AckTracker> {
        &self.tracker
    }

    /// Run the actions of `rule` for `message`.
    pub async fn dispatch(
        &self,
        message: &MessageSnapshot,
        rule: &Rule,
        baseline: Option<i32>,
    ) -> DispatchOutcome {
        self.dispatch_at(message, rule, baseline, Utc::now()).await
    }

    /// [`Dispatcher::dispatch`] with an explicit clock, used for tracking expiry.
    pub async fn dispatch_at(
        &self,
        message: &MessageSnapshot,
        rule: &Rule,
        baseline: Option<i32>,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let (send, tracked) = self.send_notification(message, rule, baseline, now).await;
        let reaction = self.apply_reaction(message, rule).await;

        DispatchOutcome {
            send,
            reaction,
            tracked,
        }
    }

    async fn send_notification(
        &self,
        message: &MessageSnapshot,
        rule: &Rule,
        baseline: Option<i32>,
        now: DateTime<Utc>,
    ) -> (SendOutcome, bool) {
        let actions = &rule.actions;

        if actions.pushover_destination.is_empty() {
            debug!(
                rule_name = %rule.name,
                message_id = %message.id,
                "Rule has no pushoverDestination, skipping notification"
            );
            return (SendOutcome::NoDestination, false);
        }

        if self.order.suppresses(actions.priority, baseline) {
            let baseline = baseline.unwrap_or(actions.priority);
            info!(
                rule_name = %rule.name,
                message_id = %message.id,
                priority = actions.priority,
                baseline = baseline,
                order = %self.order,
                "Suppressing Pushover notification: a notification at least as urgent was already sent"
            );
            metrics::counter!(
                "d2p_notifications_suppressed_total",
                "rule_name" => rule.name.clone()
            )
            .increment(1);
            return (SendOutcome::Suppressed { baseline }, false);
        }

        let emergency = if is_emergency(actions.priority) {
            match &actions.emergency {
                Some(params) => Some(params),
                None => {
                    warn!(
                        rule_name = %rule.name,
                        "Emergency priority without emergency parameters, sending as high priority without acknowledgement tracking"
                    );
                    None
                }
            }
        } else {
            None
        };

        let priority = match (is_emergency(actions.priority), emergency) {
            (true, None) => HIGH_PRIORITY,
            _ => actions.priority,
        };
        let mut notification = PushNotification::for_message(
            &rule.name,
            &actions.pushover_destination,
            priority,
            message,
        );
        if let Some(params) = emergency {
            notification = notification.with_emergency(EmergencyTiming {
                retry: params.retry,
                expire: params.expire,
            });
        }

        let receipt = match self.push.send(&notification).await {
            Ok(receipt) => receipt,
            Err(e) => {
                error!(
                    rule_name = %rule.name,
                    message_id = %message.id,
                    error = %e,
                    "Failed to send Pushover notification"
                );
                return (SendOutcome::Failed(e.to_string()), false);
            }
        };
        info!(
            rule_name = %rule.name,
            message_id = %message.id,
            priority = priority,
            receipt = ?receipt.receipt,
            "Pushover notification sent"
        );

        let mut tracked = false;
        if let Some(params) = emergency {
            match receipt.receipt.as_deref() {
                Some(receipt_id) => {
                    let expire = if params.expire <= 0 {
                        warn!(
                            rule_name = %rule.name,
                            expire = params.expire,
                            fallback_secs = DEFAULT_TRACKING_EXPIRE_SECS,
                            "Invalid emergency expire, using default tracking window"
                        );
                        DEFAULT_TRACKING_EXPIRE_SECS
                    } else {
                        params.expire
                    };
                    self.tracker.register(TrackedNotification {
                        source_message_id: message.id.clone(),
                        source_channel_id: message.channel_id.clone(),
                        receipt_id: receipt_id.to_string(),
                        ack_emoji: params.ack_emoji.clone().filter(|e| !e.is_empty()),
                        rule_name: rule.name.clone(),
                        expires_at: now + TimeDelta::seconds(expire),
                    });
                    tracked = true;
                }
                None => warn!(
                    rule_name = %rule.name,
                    message_id = %message.id,
                    "Emergency notification returned no receipt, cannot track acknowledgement"
                ),
            }
        }

        (
            SendOutcome::Sent {
                receipt: receipt.receipt,
            },
            tracked,
        )
    }

    async fn apply_reaction(&self, message: &MessageSnapshot, rule: &Rule) -> ReactionOutcome {
        let Some(emoji) = rule
            .actions
            .reaction_emoji
            .as_deref()
            .filter(|e| !e.is_empty())
        else {
            return ReactionOutcome::NotConfigured;
        };

        match self
            .chat
            .add_reaction(&message.channel_id, &message.id, emoji)
            .await
        {
            Ok(()) => {
                debug!(
                    rule_name = %rule.name,
                    message_id = %message.id,
                    emoji = %emoji,
                    "Added reaction"
                );
                ReactionOutcome::Applied
            }
            Err(e) => {
                error!(
                    rule_name = %rule.name,
                    message_id = %message.id,
                    emoji = %emoji,
                    error = %e,
                    "Failed to add reaction"
                );
                ReactionOutcome::Failed(e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("push", &self.push)
            .field("order", &self.order)
            .field("tracked", &self.tracker.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmergencyParams, RuleActions, RuleConditions};
    use crate::test_support::{FakeChat, FakePush};

    struct Harness {
        push: Arc<FakePush>,
        chat: Arc<FakeChat>,
        tracker: Arc<AckTracker>,
        dispatcher: Dispatcher,
    }

    fn harness_with(push: FakePush, chat: FakeChat, order: PriorityOrder) -> Harness {
        let push = Arc::new(push);
        let chat = Arc::new(chat);
        let tracker = Arc::new(AckTracker::new());
        let dispatcher = Dispatcher::new(push.clone(), chat.clone(), tracker.clone(), order);
        Harness {
            push,
            chat,
            tracker,
            dispatcher,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakePush::new(),
            FakeChat::new(Some("bot")),
            PriorityOrder::LowerIsMoreUrgent,
        )
    }

    fn message() -> MessageSnapshot {
        MessageSnapshot {
            id: "M1".to_string(),
            channel_id: "C1".to_string(),
            guild_id: Some("G1".to_string()),
            author_id: "u1".to_string(),
            content: "build is red".to_string(),
            ..Default::default()
        }
    }

    fn rule(priority: i32, reaction: Option<&str>) -> Rule {
        Rule::new(
            "ci",
            RuleConditions {
                channel_id: Some("C1".to_string()),
                ..Default::default()
            },
            RuleActions {
                pushover_destination: "U1".to_string(),
                priority,
                reaction_emoji: reaction.map(String::from),
                emergency: None,
            },
        )
    }

    fn emergency_rule(expire: i64, ack: Option<&str>) -> Rule {
        let mut rule = rule(2, Some("🚨"));
        rule.actions.emergency = Some(EmergencyParams {
            ack_emoji: ack.map(String::from),
            expire,
            retry: 60,
        });
        rule
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    // ===================================================================
    // Send and reaction
    // ===================================================================

    #[tokio::test]
    async fn first_observation_sends_and_reacts() {
        let h = harness();

        let outcome = h.dispatcher.dispatch(&message(), &rule(0, Some("✅")), None).await;

        assert_eq!(outcome.send, SendOutcome::Sent { receipt: None });
        assert_eq!(outcome.reaction, ReactionOutcome::Applied);
        assert!(!outcome.tracked);

        let sent = h.push.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, "U1");
        assert_eq!(sent[0].priority, 0);
        assert_eq!(sent[0].title, "Discord Notification");
        assert_eq!(
            sent[0].message,
            "build is red\n\nDiscord Link: https://discord.com/channels/G1/C1/M1"
        );
        assert_eq!(
            h.chat.reactions(),
            vec![("C1".to_string(), "M1".to_string(), "✅".to_string())]
        );
    }

    #[tokio::test]
    async fn equal_baseline_suppresses_but_still_reacts() {
        let h = harness();

        let outcome = h
            .dispatcher
            .dispatch(&message(), &rule(0, Some("✅")), Some(0))
            .await;

        assert_eq!(outcome.send, SendOutcome::Suppressed { baseline: 0 });
        assert_eq!(outcome.reaction, ReactionOutcome::Applied);
        assert!(h.push.sent().is_empty());
        assert_eq!(h.chat.reactions().len(), 1);
    }

    #[tokio::test]
    async fn empty_destination_skips_send_but_reacts() {
        let h = harness();
        let mut rule = rule(0, Some("📌"));
        rule.actions.pushover_destination.clear();

        let outcome = h.dispatcher.dispatch(&message(), &rule, Some(-2)).await;

        assert_eq!(outcome.send, SendOutcome::NoDestination);
        assert_eq!(outcome.reaction, ReactionOutcome::Applied);
        assert!(h.push.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failure_still_reacts() {
        let h = harness_with(
            FakePush::new().failing_sends(),
            FakeChat::new(Some("bot")),
            PriorityOrder::LowerIsMoreUrgent,
        );

        let outcome = h.dispatcher.dispatch(&message(), &rule(1, Some("✅")), None).await;

        assert!(matches!(outcome.send, SendOutcome::Failed(_)));
        assert_eq!(outcome.reaction, ReactionOutcome::Applied);
    }

    #[tokio::test]
    async fn reaction_failure_does_not_undo_send() {
        let h = harness_with(
            FakePush::new(),
            FakeChat::new(Some("bot")).failing_reactions(),
            PriorityOrder::LowerIsMoreUrgent,
        );

        let outcome = h.dispatcher.dispatch(&message(), &rule(0, Some("✅")), None).await;

        assert_eq!(outcome.send, SendOutcome::Sent { receipt: None });
        assert!(matches!(outcome.reaction, ReactionOutcome::Failed(_)));
        assert_eq!(h.push.sent().len(), 1);
    }

    #[tokio::test]
    async fn no_reaction_configured() {
        let h = harness();
        let outcome = h.dispatcher.dispatch(&message(), &rule(0, None), None).await;
        assert_eq!(outcome.reaction, ReactionOutcome::NotConfigured);
        assert!(h.chat.reactions().is_empty());
    }

    // ===================================================================
    // Suppression order
    // ===================================================================

    #[tokio::test]
    async fn suppression_is_monotonic_lower_is_more_urgent() {
        let baseline = 0;
        for priority in -2..=2 {
            let h = harness();
            let outcome = h
                .dispatcher
                .dispatch(&message(), &rule(priority, None), Some(baseline))
                .await;
            let suppressed = matches!(outcome.send, SendOutcome::Suppressed { .. });
            assert_eq!(suppressed, priority >= baseline, "priority {priority}");
        }
    }

    #[tokio::test]
    async fn suppression_is_monotonic_higher_is_more_urgent() {
        let baseline = 0;
        for priority in -2..=2 {
            let h = harness_with(
                FakePush::new(),
                FakeChat::new(Some("bot")),
                PriorityOrder::HigherIsMoreUrgent,
            );
            let mut rule = rule(priority, None);
            rule.actions.emergency = Some(EmergencyParams {
                ack_emoji: None,
                expire: 600,
                retry: 60,
            });
            let outcome = h
                .dispatcher
                .dispatch(&message(), &rule, Some(baseline))
                .await;
            let suppressed = matches!(outcome.send, SendOutcome::Suppressed { .. });
            assert_eq!(suppressed, priority <= baseline, "priority {priority}");
        }
    }

    // ===================================================================
    // Emergency tracking
    // ===================================================================

    #[tokio::test]
    async fn emergency_send_registers_tracking() {
        let h = harness();

        let outcome = h
            .dispatcher
            .dispatch_at(&message(), &emergency_rule(3600, Some("👀")), None, now())
            .await;

        assert!(outcome.tracked);
        let SendOutcome::Sent {
            receipt: Some(receipt),
        } = outcome.send
        else {
            panic!("expected receipt, got {:?}", outcome.send);
        };

        let sent = h.push.sent();
        assert_eq!(sent[0].priority, 2);
        assert_eq!(
            sent[0].emergency,
            Some(EmergencyTiming {
                retry: 60,
                expire: 3600
            })
        );

        let entry = h.tracker.get(&receipt).unwrap();
        assert_eq!(entry.source_message_id, "M1");
        assert_eq!(entry.source_channel_id, "C1");
        assert_eq!(entry.ack_emoji.as_deref(), Some("👀"));
        assert_eq!(entry.expires_at, now() + TimeDelta::seconds(3600));
    }

    #[tokio::test]
    async fn non_positive_expire_tracks_for_one_hour() {
        let h = harness();

        let outcome = h
            .dispatcher
            .dispatch_at(&message(), &emergency_rule(0, Some("👀")), None, now())
            .await;

        let SendOutcome::Sent {
            receipt: Some(receipt),
        } = outcome.send
        else {
            panic!("expected receipt");
        };
        assert_eq!(
            h.tracker.get(&receipt).unwrap().expires_at,
            now() + TimeDelta::seconds(DEFAULT_TRACKING_EXPIRE_SECS)
        );
    }

    #[tokio::test]
    async fn emergency_without_params_is_sent_high_and_untracked() {
        let h = harness();

        let outcome = h.dispatcher.dispatch(&message(), &rule(2, None), None).await;

        assert_eq!(outcome.send, SendOutcome::Sent { receipt: None });
        assert!(!outcome.tracked);
        assert!(h.tracker.is_empty());
        let sent = h.push.sent();
        assert_eq!(sent[0].priority, HIGH_PRIORITY);
        assert!(sent[0].emergency.is_none());
    }

    #[tokio::test]
    async fn suppressed_emergency_is_not_tracked() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(&message(), &emergency_rule(3600, Some("👀")), Some(-1))
            .await;
        assert_eq!(outcome.send, SendOutcome::Suppressed { baseline: -1 });
        assert!(h.tracker.is_empty());
    }

    #[tokio::test]
    async fn failed_emergency_send_is_not_tracked() {
        let h = harness_with(
            FakePush::new().failing_sends(),
            FakeChat::new(Some("bot")),
            PriorityOrder::LowerIsMoreUrgent,
        );
        let outcome = h
            .dispatcher
            .dispatch(&message(), &emergency_rule(3600, Some("👀")), None)
            .await;
        assert!(!outcome.tracked);
        assert!(h.tracker.is_empty());
        // The rule's own reaction is still requested.
        assert_eq!(h.chat.reactions()[0].2, "🚨");
    }
}
