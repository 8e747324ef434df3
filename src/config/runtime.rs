//! Runtime configuration with resolved rule names.

use super::secret::SecretString;
use super::types::{Config, MetricsConfig, RuleActions, RuleConditions};
use crate::priority::PriorityOrder;
use std::sync::Arc;
use std::time::Duration;

/// Display name of a rule: its configured name, or `unnamed_rule_<n>` (1-based).
pub fn display_name(name: &str, index: usize) -> String {
    if name.is_empty() {
        format!("unnamed_rule_{}", index + 1)
    } else {
        name.to_string()
    }
}

/// Runtime configuration, immutable once the process is running.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub discord_token: SecretString,
    pub pushover_app_key: SecretString,
    pub priority_order: PriorityOrder,
    pub ack_poll_interval: Duration,
    pub metrics: MetricsConfig,
    pub rules: Arc<[Rule]>,
}

/// A rule ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Display name (never empty).
    pub name: String,
    pub conditions: RuleConditions,
    pub actions: RuleActions,
}

impl Rule {
    /// Build a rule with an explicit name.
    pub fn new(name: impl Into<String>, conditions: RuleConditions, actions: RuleActions) -> Self {
        Self {
            name: name.into(),
            conditions,
            actions,
        }
    }
}

impl Config {
    /// Turn the loaded configuration into its runtime form.
    pub fn compile(self) -> RuntimeConfig {
        let rules: Vec<Rule> = self
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, rule)| Rule {
                name: display_name(&rule.name, index),
                conditions: rule.conditions,
                actions: rule.actions,
            })
            .collect();

        RuntimeConfig {
            discord_token: self.discord_token,
            pushover_app_key: self.pushover_app_key,
            priority_order: self.priority_order,
            ack_poll_interval: self.ack_poll_interval,
            metrics: self.metrics,
            rules: rules.into(),
        }
    }
}
