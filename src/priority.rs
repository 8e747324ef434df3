//! Pushover priority scale and the urgency order used for suppression.
//!
//! Pushover priorities run from -2 (lowest) to 2 (emergency). Which end of the
//! scale counts as "more urgent" when comparing a rule against the baseline
//! left by earlier bot reactions is configurable: historically the comparison
//! has been flipped more than once, so both directions are first-class.

use serde::Deserialize;

/// Lowest priority accepted by Pushover.
pub const PRIORITY_MIN: i32 = -2;

/// Highest priority accepted by Pushover.
pub const PRIORITY_MAX: i32 = 2;

/// Pushover "high" priority, used as fallback for misconfigured emergency rules.
pub const HIGH_PRIORITY: i32 = 1;

/// Pushover emergency priority: requires acknowledgement, tracked by receipt.
pub const EMERGENCY_PRIORITY: i32 = 2;

/// Returns true if `priority` is the urgent (acknowledgement-tracked) tier.
pub fn is_emergency(priority: i32) -> bool {
    priority == EMERGENCY_PRIORITY
}

/// Total order deciding which of two priorities is more urgent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// Numerically smaller priorities are more urgent. A rule is suppressed
    /// when `rule.priority >= baseline`.
    #[default]
    LowerIsMoreUrgent,
    /// Numerically larger priorities are more urgent. A rule is suppressed
    /// when `rule.priority <= baseline`.
    HigherIsMoreUrgent,
}

impl PriorityOrder {
    /// Returns true if `a` is strictly more urgent than `b`.
    pub fn is_more_urgent(self, a: i32, b: i32) -> bool {
        match self {
            PriorityOrder::LowerIsMoreUrgent => a < b,
            PriorityOrder::HigherIsMoreUrgent => a > b,
        }
    }

    /// Pick the more urgent of two priorities.
    pub fn most_urgent(self, a: i32, b: i32) -> i32 {
        if self.is_more_urgent(b, a) { b } else { a }
    }

    /// Suppression decision for a rule of `priority` given the baseline.
    ///
    /// `None` means no notification is known to have been sent for the
    /// message, so nothing is suppressed. Otherwise the rule is suppressed
    /// unless it is strictly more urgent than the baseline.
    pub fn suppresses(self, priority: i32, baseline: Option<i32>) -> bool {
        match baseline {
            Some(previous) => !self.is_more_urgent(priority, previous),
            None => false,
        }
    }
}

impl std::fmt::Display for PriorityOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityOrder::LowerIsMoreUrgent => write!(f, "lower_is_more_urgent"),
            PriorityOrder::HigherIsMoreUrgent => write!(f, "higher_is_more_urgent"),
        }
    }
}
