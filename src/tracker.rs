//! Acknowledgement tracking for emergency notifications.
//!
//! Every emergency send that returns a receipt is registered here and polled
//! until it resolves:
//!
//! ```text
//! Pending --(receipt acknowledged)--> Acknowledged   (ack emoji added)
//!    |  \--(now >= expires_at)------> Expired        (no query, no reaction)
//!    \----(terminal non-success)----> Failed         (no reaction)
//! ```
//!
//! A query error leaves the entry Pending until the next tick. Entries live in
//! a `DashMap` keyed by receipt id; the poller works over a snapshot of the
//! entries and never holds a map guard across an `.await`. Removal is the
//! commit point: only the caller whose `remove` returned the entry acts on it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::ChatSession;
use crate::notify::{PushService, ReceiptStatus};

/// An emergency notification awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedNotification {
    pub source_message_id: String,
    pub source_channel_id: String,
    pub receipt_id: String,
    /// Reaction added to the source message on acknowledgement.
    pub ack_emoji: Option<String>,
    pub rule_name: String,
    pub expires_at: DateTime<Utc>,
}

/// State of a tracked notification after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckState {
    Pending,
    Acknowledged,
    Expired,
    Failed,
}

impl AckState {
    pub fn as_str(self) -> &'static str {
        match self {
            AckState::Pending => "pending",
            AckState::Acknowledged => "acknowledged",
            AckState::Expired => "expired",
            AckState::Failed => "failed",
        }
    }
}

/// Counts of what one poll tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub pending: usize,
    pub acknowledged: usize,
    pub expired: usize,
    pub failed: usize,
    /// Entries left Pending because the receipt query failed.
    pub query_errors: usize,
}

/// What polling a single snapshot entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryPoll {
    State(AckState),
    /// The receipt query failed; the entry stays Pending.
    QueryError,
    /// Another caller removed the entry first; nothing was done.
    AlreadyResolved,
}

impl PollSummary {
    fn record(&mut self, state: AckState) {
        match state {
            AckState::Pending => self.pending += 1,
            AckState::Acknowledged => self.acknowledged += 1,
            AckState::Expired => self.expired += 1,
            AckState::Failed => self.failed += 1,
        }
    }
}

/// Registry of in-flight emergency notifications.
#[derive(Debug, Default)]
pub struct AckTracker {
    entries: DashMap<String, TrackedNotification>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a notification. A second registration of the same
    /// receipt replaces the first.
    pub fn register(&self, notification: TrackedNotification) {
        info!(
            rule_name = %notification.rule_name,
            receipt_id = %notification.receipt_id,
            message_id = %notification.source_message_id,
            ack_emoji = ?notification.ack_emoji,
            expires_at = %notification.expires_at.to_rfc3339(),
            "Tracking emergency notification"
        );
        self.entries
            .insert(notification.receipt_id.clone(), notification);
        self.update_gauge();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, receipt_id: &str) -> bool {
        self.entries.contains_key(receipt_id)
    }

    pub fn get(&self, receipt_id: &str) -> Option<TrackedNotification> {
        self.entries.get(receipt_id).map(|e| e.value().clone())
    }

    /// Run one poll tick against `now`.
    pub async fn poll_once(
        &self,
        now: DateTime<Utc>,
        push: &dyn PushService,
        chat: &dyn ChatSession,
    ) -> PollSummary {
        let snapshot: Vec<TrackedNotification> =
            self.entries.iter().map(|e| e.value().clone()).collect();

        let mut summary = PollSummary::default();
        for entry in &snapshot {
            match self.poll_entry(entry, now, push, chat).await {
                EntryPoll::State(state) => summary.record(state),
                EntryPoll::QueryError => summary.query_errors += 1,
                EntryPoll::AlreadyResolved => {
                    debug!(receipt_id = %entry.receipt_id, "Entry already resolved elsewhere")
                }
            }
        }

        if !snapshot.is_empty() {
            debug!(
                checked = snapshot.len(),
                remaining = self.len(),
                summary = ?summary,
                "Acknowledgement poll finished"
            );
        }
        summary
    }

    /// Poll a single snapshot entry.
    async fn poll_entry(
        &self,
        entry: &TrackedNotification,
        now: DateTime<Utc>,
        push: &dyn PushService,
        chat: &dyn ChatSession,
    ) -> EntryPoll {
        let receipt_id = entry.receipt_id.as_str();

        if now >= entry.expires_at {
            if self.resolve(receipt_id, AckState::Expired).is_none() {
                return EntryPoll::AlreadyResolved;
            }
            info!(
                receipt_id = %receipt_id,
                message_id = %entry.source_message_id,
                "Emergency notification expired without acknowledgement"
            );
            return EntryPoll::State(AckState::Expired);
        }

        let status = match push.receipt_status(receipt_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    receipt_id = %receipt_id,
                    error = %e,
                    "Failed to query receipt status, will retry next tick"
                );
                return EntryPoll::QueryError;
            }
        };

        match status {
            ReceiptStatus::Pending => {
                debug!(receipt_id = %receipt_id, "Emergency notification still pending");
                EntryPoll::State(AckState::Pending)
            }
            ReceiptStatus::Acknowledged => {
                let Some(resolved) = self.resolve(receipt_id, AckState::Acknowledged) else {
                    return EntryPoll::AlreadyResolved;
                };
                info!(
                    receipt_id = %receipt_id,
                    message_id = %resolved.source_message_id,
                    "Emergency notification acknowledged"
                );
                if let Some(emoji) = resolved.ack_emoji.as_deref().filter(|e| !e.is_empty()) {
                    match chat
                        .add_reaction(
                            &resolved.source_channel_id,
                            &resolved.source_message_id,
                            emoji,
                        )
                        .await
                    {
                        Ok(()) => debug!(
                            receipt_id = %receipt_id,
                            emoji = %emoji,
                            "Added acknowledgement reaction"
                        ),
                        Err(e) => error!(
                            receipt_id = %receipt_id,
                            message_id = %resolved.source_message_id,
                            emoji = %emoji,
                            error = %e,
                            "Failed to add acknowledgement reaction"
                        ),
                    }
                }
                EntryPoll::State(AckState::Acknowledged)
            }
            ReceiptStatus::Failed(reason) => {
                if self.resolve(receipt_id, AckState::Failed).is_none() {
                    return EntryPoll::AlreadyResolved;
                }
                warn!(
                    receipt_id = %receipt_id,
                    message_id = %entry.source_message_id,
                    reason = %reason,
                    "Emergency notification failed, no longer tracking"
                );
                EntryPoll::State(AckState::Failed)
            }
        }
    }

    /// Remove an entry and record its terminal state.
    fn resolve(&self, receipt_id: &str, state: AckState) -> Option<TrackedNotification> {
        let (_, entry) = self.entries.remove(receipt_id)?;
        metrics::counter!("d2p_ack_transitions_total", "state" => state.as_str()).increment(1);
        self.update_gauge();
        Some(entry)
    }

    fn update_gauge(&self) {
        metrics::gauge!("d2p_tracked_notifications").set(self.entries.len() as f64);
    }

    /// Poll every `interval` until cancelled.
    ///
    /// A tick in progress when cancellation fires is allowed to finish.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        push: Arc<dyn PushService>,
        chat: Arc<dyn ChatSession>,
        cancel: CancellationToken,
    ) {
        info!(interval_ms = interval.as_millis(), "Acknowledgement poller started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be tracked yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(tracked = self.len(), "Acknowledgement poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if !self.is_empty() {
                        self.poll_once(Utc::now(), push.as_ref(), chat.as_ref()).await;
                    }
                }
            }
        }
    }
}
