//! Notification payload and service responses.

use crate::message::MessageSnapshot;

/// Title of every notification.
pub const NOTIFICATION_TITLE: &str = "Discord Notification";

/// Retry/expire parameters of an emergency notification, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyTiming {
    pub retry: i64,
    pub expire: i64,
}

/// Notification ready to be handed to a [`super::PushService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    /// Rule name for tracing and metrics.
    pub rule_name: String,
    /// Pushover user or group key.
    pub destination: String,
    pub title: String,
    pub message: String,
    pub priority: i32,
    /// Supplementary URL (the Discord back-link).
    pub url: Option<String>,
    pub url_title: Option<String>,
    /// Present only for emergency sends.
    pub emergency: Option<EmergencyTiming>,
}

impl PushNotification {
    /// Build the notification for a matched message.
    ///
    /// The body is the message content followed by a link back to Discord.
    pub fn for_message(
        rule_name: &str,
        destination: &str,
        priority: i32,
        message: &MessageSnapshot,
    ) -> Self {
        let link = message.link();
        Self {
            rule_name: rule_name.to_string(),
            destination: destination.to_string(),
            title: NOTIFICATION_TITLE.to_string(),
            message: format!("{}\n\nDiscord Link: {}", message.content, link),
            priority,
            url: Some(link),
            url_title: Some("Open in Discord".to_string()),
            emergency: None,
        }
    }

    pub fn with_emergency(mut self, timing: EmergencyTiming) -> Self {
        self.emergency = Some(timing);
        self
    }
}

/// Result of an accepted send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Request id assigned by the service.
    pub request: String,
    /// Receipt id, returned for emergency notifications only.
    pub receipt: Option<String>,
}

/// Acknowledgement status of an emergency receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Still retrying, not yet acknowledged.
    Pending,
    /// A recipient acknowledged the notification.
    Acknowledged,
    /// Terminal non-success (unknown receipt, or expired without acknowledgement).
    Failed(String),
}
