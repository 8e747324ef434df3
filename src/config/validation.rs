//! Rule-level validation helpers.

use super::runtime::display_name;
use super::types::RuleConfig;
use crate::error::ConfigError;
use crate::priority::{PRIORITY_MAX, PRIORITY_MIN, is_emergency};

/// Minimum retry interval accepted by Pushover for emergency notifications.
pub const PUSHOVER_MIN_RETRY_SECS: i64 = 30;

/// Maximum expiry accepted by Pushover for emergency notifications.
pub const PUSHOVER_MAX_EXPIRE_SECS: i64 = 10_800;

/// Validate one rule, returning every hard error found.
pub fn validate_rule(rule: &RuleConfig, index: usize) -> Vec<ConfigError> {
    let name = display_name(&rule.name, index);
    let mut errors = Vec::new();

    let priority = rule.actions.priority;
    if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
        errors.push(ConfigError::InvalidRule {
            rule: name.clone(),
            message: format!(
                "priority {} out of range {}..={}",
                priority, PRIORITY_MIN, PRIORITY_MAX
            ),
        });
    }

    if is_emergency(priority)
        && let Some(ref emergency) = rule.actions.emergency
    {
        if emergency.retry < PUSHOVER_MIN_RETRY_SECS {
            errors.push(ConfigError::InvalidRule {
                rule: name.clone(),
                message: format!(
                    "emergency.retry must be at least {} seconds (got {})",
                    PUSHOVER_MIN_RETRY_SECS, emergency.retry
                ),
            });
        }
        if emergency.expire > PUSHOVER_MAX_EXPIRE_SECS {
            errors.push(ConfigError::InvalidRule {
                rule: name.clone(),
                message: format!(
                    "emergency.expire must be at most {} seconds (got {})",
                    PUSHOVER_MAX_EXPIRE_SECS, emergency.expire
                ),
            });
        }
    }

    if rule
        .conditions
        .content_includes
        .iter()
        .any(|keyword| keyword.is_empty())
    {
        errors.push(ConfigError::InvalidRule {
            rule: name,
            message: "contentIncludes contains an empty keyword".to_string(),
        });
    }

    errors
}

/// Recoverable misconfigurations of one rule.
pub fn rule_warnings(rule: &RuleConfig, index: usize) -> Vec<String> {
    let name = display_name(&rule.name, index);
    let actions = &rule.actions;
    let mut warnings = Vec::new();

    match (is_emergency(actions.priority), &actions.emergency) {
        (true, None) => warnings.push(format!(
            "rule '{}' has emergency priority but no emergency parameters; it will be sent as high priority and acknowledgement will not be tracked",
            name
        )),
        (true, Some(emergency)) if emergency.expire <= 0 => warnings.push(format!(
            "rule '{}' has invalid emergency.expire ({}); tracking falls back to one hour",
            name, emergency.expire
        )),
        (false, Some(_)) => warnings.push(format!(
            "rule '{}' defines emergency parameters but priority is {}; they are ignored",
            name, actions.priority
        )),
        _ => {}
    }

    if actions.pushover_destination.is_empty() && actions.reaction_emoji.is_none() {
        warnings.push(format!(
            "rule '{}' has neither pushoverDestination nor reactionEmoji; matching it has no effect",
            name
        ));
    }

    warnings
}
