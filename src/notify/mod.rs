//! Push notification delivery.
//!
//! This module implements the outbound side of the routing engine:
//! - Abstract `PushService` trait for the notification service
//! - `PushoverClient`, the Pushover Messages/Receipts implementation
//! - HTTP sending with exponential backoff retry
//!
//! # Architecture
//!
//! ```text
//! router.rs -> rules.rs -> dispatch.rs -> notify/ -> Pushover
//!                                      \-> tracker.rs -> notify/ (receipts)
//! ```
//!
//! # Key Features
//!
//! - **Narrow trait**: the dispatcher and tracker are tested against fakes
//! - **Retry**: transient send failures back off exponentially (500ms to 5s)
//! - **Metrics**: sent notifications and send errors are counted

mod payload;
pub mod pushover;
mod traits;

use std::time::Duration;

pub use payload::{
    EmergencyTiming, NOTIFICATION_TITLE, PushNotification, ReceiptStatus, SendReceipt,
};
pub use pushover::PushoverClient;
pub use traits::PushService;

/// Calculate exponential backoff delay.
///
/// # Arguments
///
/// * `attempt` - Zero-based attempt number
/// * `base` - Delay of the first retry
/// * `max` - Upper bound of the delay
///
/// # Returns
///
/// `min(base * 2^attempt, max)`, saturating on overflow.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = base.saturating_mul(2_u32.saturating_pow(attempt));
    std::cmp::min(delay, max)
}
