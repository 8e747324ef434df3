//! In-memory chat and push fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::chat::ChatSession;
use crate::error::{ChatError, NotifyError};
use crate::message::MessageSnapshot;
use crate::notify::{PushNotification, PushService, ReceiptStatus, SendReceipt};

/// Recorded reaction request: (channel_id, message_id, emoji).
pub type ReactionCall = (String, String, String);

#[derive(Default)]
pub struct FakeChat {
    bot_id: Option<String>,
    messages: Mutex<HashMap<String, MessageSnapshot>>,
    reactions: Mutex<Vec<ReactionCall>>,
    fetches: Mutex<Vec<String>>,
    fail_reactions: bool,
}

impl FakeChat {
    pub fn new(bot_id: Option<&str>) -> Self {
        Self {
            bot_id: bot_id.map(String::from),
            ..Default::default()
        }
    }

    pub fn failing_reactions(mut self) -> Self {
        self.fail_reactions = true;
        self
    }

    pub fn with_message(self, message: MessageSnapshot) -> Self {
        self.messages
            .lock()
            .unwrap()
            .insert(message.id.clone(), message);
        self
    }

    pub fn reactions(&self) -> Vec<ReactionCall> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSession for FakeChat {
    async fn fetch_message(
        &self,
        _channel_id: &str,
        message_id: &str,
    ) -> Result<MessageSnapshot, ChatError> {
        self.fetches.lock().unwrap().push(message_id.to_string());
        self.messages
            .lock()
            .unwrap()
            .get(message_id)
            .cloned()
            .ok_or_else(|| ChatError::Api {
                status: 404,
                message: "Unknown Message".to_string(),
            })
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.reactions.lock().unwrap().push((
            channel_id.to_string(),
            message_id.to_string(),
            emoji.to_string(),
        ));
        if self.fail_reactions {
            return Err(ChatError::RequestFailed("reaction refused".to_string()));
        }
        Ok(())
    }

    fn bot_user_id(&self) -> Option<String> {
        self.bot_id.clone()
    }
}

#[derive(Default)]
pub struct FakePush {
    sent: Mutex<Vec<PushNotification>>,
    statuses: Mutex<HashMap<String, ReceiptStatus>>,
    queries: Mutex<Vec<String>>,
    fail_sends: bool,
    fail_queries: bool,
}

impl FakePush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn set_status(&self, receipt: &str, status: ReceiptStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(receipt.to_string(), status);
    }

    pub fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushService for FakePush {
    fn name(&self) -> &str {
        "fake"
    }

    async fn send(&self, notification: &PushNotification) -> Result<SendReceipt, NotifyError> {
        if self.fail_sends {
            return Err(NotifyError::MaxRetriesExceeded);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(notification.clone());
        let receipt = (notification.emergency.is_some() && notification.priority == 2)
            .then(|| format!("rcpt-{}", sent.len()));
        Ok(SendReceipt {
            request: format!("req-{}", sent.len()),
            receipt,
        })
    }

    async fn receipt_status(&self, receipt: &str) -> Result<ReceiptStatus, NotifyError> {
        self.queries.lock().unwrap().push(receipt.to_string());
        if self.fail_queries {
            return Err(NotifyError::ReceiptFailed("connection reset".to_string()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(receipt)
            .cloned()
            .unwrap_or(ReceiptStatus::Pending))
    }
}
