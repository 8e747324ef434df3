//! Core configuration types and loading.

use super::env::substitute_env_vars;
use super::secret::SecretString;
use super::validation::{validate_rule, rule_warnings};
use crate::error::ConfigError;
use crate::priority::PriorityOrder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration file names looked up in the working directory, in order.
pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["discord2pushover.yaml", "discord2pushover.yml"];

/// Default interval between acknowledgement polls.
pub const DEFAULT_ACK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Main configuration structure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Discord bot token (without the `Bot ` prefix).
    pub discord_token: SecretString,
    /// Pushover application token shared by all rules.
    pub pushover_app_key: SecretString,
    /// Log level used when `RUST_LOG` is not set.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Urgency order used by notification suppression.
    #[serde(default)]
    pub priority_order: PriorityOrder,
    /// Interval between acknowledgement polls for emergency notifications.
    #[serde(default = "default_ack_poll_interval", with = "humantime_serde")]
    pub ack_poll_interval: Duration,
    /// Metrics exposition configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Ordered rule list; the first matching rule wins.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_ack_poll_interval() -> Duration {
    DEFAULT_ACK_POLL_INTERVAL
}

/// Metrics exposition configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics exposition is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Port to expose metrics on (default: 9090).
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// A single routing rule as written in the YAML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub conditions: RuleConditions,
    #[serde(default)]
    pub actions: RuleActions,
}

/// Conditions of a rule. Every field is optional; an empty field never filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConditions {
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub message_has_emoji: Vec<String>,
    #[serde(default)]
    pub react_to_at_mention: bool,
    #[serde(default)]
    pub specific_mentions: Vec<String>,
    #[serde(default)]
    pub content_includes: Vec<String>,
}

impl RuleConditions {
    /// Returns true if no condition is active (the rule matches everything).
    pub fn is_empty(&self) -> bool {
        self.channel_id.as_deref().is_none_or(str::is_empty)
            && self.message_has_emoji.is_empty()
            && !self.react_to_at_mention
            && self.specific_mentions.is_empty()
            && self.content_includes.is_empty()
    }
}

/// Actions taken when a rule matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleActions {
    /// Pushover user or group key. Empty means "no notification".
    #[serde(default)]
    pub pushover_destination: String,
    /// Pushover priority, -2..=2.
    #[serde(default)]
    pub priority: i32,
    /// Reaction the bot adds to the source message after matching.
    #[serde(default)]
    pub reaction_emoji: Option<String>,
    /// Emergency parameters, required when `priority` is 2.
    #[serde(default)]
    pub emergency: Option<EmergencyParams>,
}

/// Parameters of Pushover emergency-priority notifications.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyParams {
    /// Reaction added to the source message once the notification is acknowledged.
    #[serde(default)]
    pub ack_emoji: Option<String>,
    /// Seconds until Pushover stops retrying (and tracking gives up).
    #[serde(default)]
    pub expire: i64,
    /// Seconds between Pushover retries.
    #[serde(default)]
    pub retry: i64,
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// `$VAR` and `${VAR}` placeholders are substituted from the environment
    /// before the YAML is parsed.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        tracing::info!(path = %path.display(), "Reading configuration file");
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        Self::from_yaml(&substitute_env_vars(&content))
    }

    /// Parse configuration from YAML text (no environment substitution).
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Resolve the configuration path.
    ///
    /// An explicit path must exist. Otherwise the default file names are
    /// looked up in `cwd`.
    pub fn resolve_path(explicit: Option<&Path>, cwd: &Path) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return if path.exists() {
                Ok(path.to_path_buf())
            } else {
                Err(ConfigError::NotFound(path.display().to_string()))
            };
        }

        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| cwd.join(name))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| {
                ConfigError::NotFound(format!(
                    "no {} in {}",
                    DEFAULT_CONFIG_FILES.join(" or "),
                    cwd.display()
                ))
            })
    }

    /// Validate the whole configuration, collecting every error.
    ///
    /// # Errors
    /// Returns a `Vec<ConfigError>` containing all validation errors found.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if self.discord_token.expose().trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "discordToken is missing".to_string(),
            ));
        }
        if self.pushover_app_key.expose().trim().is_empty() {
            errors.push(ConfigError::ValidationError(
                "pushoverAppKey is missing".to_string(),
            ));
        }
        if self.ack_poll_interval.is_zero() {
            errors.push(ConfigError::ValidationError(
                "ackPollInterval must be greater than zero".to_string(),
            ));
        }

        for (index, rule) in self.rules.iter().enumerate() {
            errors.extend(validate_rule(rule, index));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Recoverable inconsistencies worth a warning at startup.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.rules.is_empty() {
            warnings.push("no rules configured, no notification will ever be sent".to_string());
        }
        for (index, rule) in self.rules.iter().enumerate() {
            warnings.extend(rule_warnings(rule, index));
        }
        warnings
    }
}
