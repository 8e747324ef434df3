//! Centralized error types for discord2pushover using thiserror.
//!
//! Only configuration errors are fatal, and only at startup. Everything else
//! is scoped to the event or poll tick that raised it.

use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },
    #[error("configuration file not found: {0}")]
    NotFound(String),
}

/// Errors returned by the chat platform (Discord REST) collaborator.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("discord returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
}

/// Errors related to Pushover notification sending and receipt polling.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("pushover rejected the request (status {status}): {errors}")]
    Rejected { status: i64, errors: String },
    #[error("receipt query failed: {0}")]
    ReceiptFailed(String),
    #[error("max retries exceeded")]
    MaxRetriesExceeded,
}

/// Errors related to the Discord gateway connection.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("authentication rejected by gateway (close code {0})")]
    AuthenticationFailed(u16),
    #[error("event channel closed")]
    ChannelClosed,
}
