//! Push service trait definition.

use async_trait::async_trait;

use super::{PushNotification, ReceiptStatus, SendReceipt};
use crate::error::NotifyError;

/// Abstract push notification service.
///
/// Implementations must be `Send + Sync` to work across async tasks.
/// Each implementation manages its own retry/backoff logic internally.
///
/// # Example
///
/// ```ignore
/// use discord2pushover::notify::{PushService, PushNotification, ReceiptStatus, SendReceipt};
///
/// struct Silent;
///
/// #[async_trait]
/// impl PushService for Silent {
///     fn name(&self) -> &str { "silent" }
///     async fn send(&self, _: &PushNotification) -> Result<SendReceipt, NotifyError> {
///         Ok(SendReceipt::default())
///     }
///     async fn receipt_status(&self, _: &str) -> Result<ReceiptStatus, NotifyError> {
///         Ok(ReceiptStatus::Pending)
///     }
/// }
/// ```
#[async_trait]
pub trait PushService: Send + Sync {
    /// Service name used in logs (e.g., "pushover").
    fn name(&self) -> &str;

    /// Send a notification.
    ///
    /// # Returns
    ///
    /// * `Ok(SendReceipt)` - Accepted; `receipt` is set for emergency sends
    /// * `Err(NotifyError)` - Rejected, or failed after all retries
    async fn send(&self, notification: &PushNotification) -> Result<SendReceipt, NotifyError>;

    /// Query the acknowledgement status of an emergency receipt.
    ///
    /// An `Err` means the status is unknown (transport failure) and the
    /// caller should simply ask again later.
    async fn receipt_status(&self, receipt: &str) -> Result<ReceiptStatus, NotifyError>;
}

impl std::fmt::Debug for dyn PushService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushService")
            .field("name", &self.name())
            .finish()
    }
}
