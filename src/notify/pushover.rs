//! Pushover client implementation.
//!
//! Implements [`PushService`] on top of the Pushover Messages and Receipts
//! APIs, with exponential backoff retry on transient send failures.

use crate::config::SecretString;
use crate::error::NotifyError;
use crate::notify::{
    EmergencyTiming, PushNotification, PushService, ReceiptStatus, SendReceipt, backoff_delay,
};
use crate::priority::{EMERGENCY_PRIORITY, HIGH_PRIORITY, PRIORITY_MAX, PRIORITY_MIN};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::Instrument;

/// Public Pushover API endpoint.
pub const DEFAULT_PUSHOVER_URL: &str = "https://api.pushover.net";

/// Backoff base delay for Pushover retries.
const PUSHOVER_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Maximum backoff delay for Pushover retries.
const PUSHOVER_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Maximum number of send attempts.
const PUSHOVER_MAX_RETRIES: u32 = 3;

/// Form body of `POST /1/messages.json`.
#[derive(Debug, Serialize)]
struct MessageForm<'a> {
    token: &'a str,
    user: &'a str,
    title: &'a str,
    message: &'a str,
    priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expire: Option<i64>,
}

/// Response of `POST /1/messages.json`.
#[derive(Debug, Deserialize)]
struct MessageResponse {
    status: i64,
    #[serde(default)]
    request: String,
    #[serde(default)]
    receipt: Option<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Response of `GET /1/receipts/{receipt}.json`.
#[derive(Debug, Deserialize)]
struct ReceiptResponse {
    status: i64,
    #[serde(default)]
    acknowledged: i64,
    #[serde(default)]
    expired: i64,
    #[serde(default)]
    errors: Vec<String>,
}

impl ReceiptResponse {
    fn into_status(self) -> ReceiptStatus {
        if self.status != 1 {
            ReceiptStatus::Failed(format!(
                "status {}: {}",
                self.status,
                self.errors.join(", ")
            ))
        } else if self.acknowledged == 1 {
            ReceiptStatus::Acknowledged
        } else if self.expired == 1 {
            ReceiptStatus::Failed("expired without acknowledgement".to_string())
        } else {
            ReceiptStatus::Pending
        }
    }
}

/// Whether a receipt query status means the receipt no longer exists.
fn receipt_gone(status: StatusCode) -> bool {
    matches!(status, StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND)
}

/// Priority and emergency timing actually sent.
///
/// Out-of-range priorities go out as normal (0). Emergency priority without
/// timing cannot be accepted by Pushover and goes out as high (1).
fn effective_priority(notification: &PushNotification) -> (i32, Option<EmergencyTiming>) {
    let priority = notification.priority;
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        tracing::warn!(
            priority = priority,
            destination = %notification.destination,
            "Unknown priority, sending as normal priority"
        );
        return (0, None);
    }
    if priority == EMERGENCY_PRIORITY {
        return match notification.emergency {
            Some(timing) => (EMERGENCY_PRIORITY, Some(timing)),
            None => {
                tracing::warn!(
                    destination = %notification.destination,
                    "Emergency priority without emergency parameters, sending as high priority"
                );
                (HIGH_PRIORITY, None)
            }
        };
    }
    (priority, None)
}

/// Pushover client.
///
/// # Retry Policy
///
/// - **5xx errors**: Retry (server temporarily unavailable)
/// - **Network errors**: Retry (timeout, connection refused)
/// - **4xx errors / `status != 1`**: Do NOT retry (invalid key, bad payload)
///
/// Receipt queries are never retried here: the acknowledgement poller asks
/// again on its next tick. Only a 200 with `status != 1`, or a 400/404 for
/// an unknown receipt, is terminal; any other non-2xx is a query error.
pub struct PushoverClient {
    /// HTTP client (shared, connection pooling).
    client: reqwest::Client,
    app_key: SecretString,
    base_url: String,
}

impl PushoverClient {
    /// Create a client against the public Pushover API.
    pub fn new(client: reqwest::Client, app_key: SecretString) -> Self {
        Self::with_base_url(client, app_key, DEFAULT_PUSHOVER_URL)
    }

    /// Create a client against another endpoint (used by tests).
    pub fn with_base_url(
        client: reqwest::Client,
        app_key: SecretString,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            app_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn record_error(&self) {
        metrics::counter!("d2p_notify_errors_total").increment(1);
    }
}

#[async_trait]
impl PushService for PushoverClient {
    fn name(&self) -> &str {
        "pushover"
    }

    async fn send(&self, notification: &PushNotification) -> Result<SendReceipt, NotifyError> {
        let span = tracing::info_span!(
            "send_pushover",
            rule_name = %notification.rule_name,
            destination = %notification.destination
        );
        self.send_with_retry(notification).instrument(span).await
    }

    async fn receipt_status(&self, receipt: &str) -> Result<ReceiptStatus, NotifyError> {
        let url = format!("{}/1/receipts/{}.json", self.base_url, receipt);

        let response = self
            .client
            .get(&url)
            .query(&[("token", self.app_key.expose())])
            .send()
            .await
            .map_err(|e| NotifyError::ReceiptFailed(e.to_string()))?;

        let http_status = response.status();
        let gone = receipt_gone(http_status);
        if !http_status.is_success() && !gone {
            return Err(NotifyError::ReceiptFailed(format!("HTTP {}", http_status)));
        }

        let status = match response.json::<ReceiptResponse>().await {
            Ok(body) => body.into_status(),
            Err(_) if gone => ReceiptStatus::Failed(format!("HTTP {}", http_status)),
            Err(e) => {
                return Err(NotifyError::ReceiptFailed(format!(
                    "HTTP {}: {}",
                    http_status, e
                )));
            }
        };
        tracing::debug!(receipt_id = %receipt, status = ?status, "Receipt status");
        Ok(status)
    }
}

impl PushoverClient {
    async fn send_with_retry(
        &self,
        notification: &PushNotification,
    ) -> Result<SendReceipt, NotifyError> {
        let (priority, emergency) = effective_priority(notification);
        let form = MessageForm {
            token: self.app_key.expose(),
            user: &notification.destination,
            title: &notification.title,
            message: &notification.message,
            priority,
            url: notification.url.as_deref(),
            url_title: notification.url_title.as_deref(),
            retry: emergency.map(|e| e.retry),
            expire: emergency.map(|e| e.expire),
        };
        let url = format!("{}/1/messages.json", self.base_url);

        for attempt in 0..PUSHOVER_MAX_RETRIES {
            match self.client.post(&url).form(&form).send().await {
                Ok(response) if response.status().is_server_error() => {
                    tracing::warn!(
                        attempt = attempt,
                        status = %response.status(),
                        "Pushover returned server error, retrying"
                    );
                }
                Ok(response) => {
                    let http_status = response.status();
                    return match response.json::<MessageResponse>().await {
                        Ok(body) if body.status == 1 => {
                            tracing::info!(
                                priority = priority,
                                request = %body.request,
                                receipt = ?body.receipt,
                                "Notification sent successfully"
                            );
                            metrics::counter!(
                                "d2p_notifications_sent_total",
                                "rule_name" => notification.rule_name.clone()
                            )
                            .increment(1);
                            Ok(SendReceipt {
                                request: body.request,
                                receipt: body.receipt.filter(|r| !r.is_empty()),
                            })
                        }
                        Ok(body) => {
                            tracing::error!(
                                status = body.status,
                                http_status = %http_status,
                                errors = ?body.errors,
                                "Pushover rejected notification, not retrying"
                            );
                            self.record_error();
                            Err(NotifyError::Rejected {
                                status: body.status,
                                errors: body.errors.join(", "),
                            })
                        }
                        Err(e) => {
                            tracing::error!(
                                http_status = %http_status,
                                error = %e,
                                "Unreadable Pushover response, not retrying"
                            );
                            self.record_error();
                            Err(NotifyError::SendFailed(format!(
                                "HTTP {}: invalid response body: {}",
                                http_status, e
                            )))
                        }
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt,
                        error = %e,
                        "Failed to reach Pushover, retrying"
                    );
                }
            }

            if attempt < PUSHOVER_MAX_RETRIES - 1 {
                let delay = backoff_delay(attempt, PUSHOVER_BACKOFF_BASE, PUSHOVER_BACKOFF_MAX);
                tracing::debug!(delay_ms = delay.as_millis(), "Waiting before retry");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(
            max_retries = PUSHOVER_MAX_RETRIES,
            "Failed to send notification after all retries"
        );
        self.record_error();
        Err(NotifyError::MaxRetriesExceeded)
    }
}

impl std::fmt::Debug for PushoverClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushoverClient")
            .field("base_url", &self.base_url)
            .field("app_key", &self.app_key)
            .finish()
    }
}
