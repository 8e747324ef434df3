//! Configuration loading and validation for discord2pushover.
//!
//! This module handles loading the YAML configuration file, environment
//! variable substitution, validation, and compilation into the runtime form.

mod env;
mod runtime;
mod secret;
mod types;
mod validation;

// Re-exports publics
pub use env::substitute_env_vars;
pub use runtime::{Rule, RuntimeConfig, display_name};
pub use secret::SecretString;
pub use types::{
    Config, DEFAULT_ACK_POLL_INTERVAL, DEFAULT_CONFIG_FILES, EmergencyParams, MetricsConfig,
    RuleActions, RuleConditions, RuleConfig,
};
pub use validation::{PUSHOVER_MAX_EXPIRE_SECS, PUSHOVER_MIN_RETRY_SECS};
